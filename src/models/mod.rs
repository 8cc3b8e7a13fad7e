mod feed;
mod outcome;

pub use feed::{FeedItem, FeedMetadata, SentItem, Validators};
pub use outcome::{FetchError, PollOutcome};
