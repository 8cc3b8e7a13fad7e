mod fetcher;
mod parse;

use async_trait::async_trait;

use crate::models::{PollOutcome, Validators};

pub use fetcher::FeedFetcher;

/// One conditional fetch of a feed, classified into a [`PollOutcome`].
///
/// Implementations never touch the store and never fail outright: network and
/// parse errors come back as [`PollOutcome::TransientFailure`].
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str, cached: &Validators) -> PollOutcome;
}
