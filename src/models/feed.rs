use chrono::{DateTime, Utc};

/// A normalized feed entry, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// Publisher GUID, or the link when the feed supplies none.
    pub guid: String,
    pub published: Option<DateTime<Utc>>,
    pub summary: String,
}

/// Record of an entry that was delivered, or suppressed on a feed's first poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentItem {
    pub feed_url: String,
    pub item_guid: String,
    pub sent_at: DateTime<Utc>,
}

impl SentItem {
    pub fn new(feed_url: &str, item_guid: &str, sent_at: DateTime<Utc>) -> Self {
        Self {
            feed_url: feed_url.to_string(),
            item_guid: item_guid.to_string(),
            sent_at,
        }
    }
}

/// Cache validators replayed on the next conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

impl Validators {
    pub fn new(last_modified: Option<String>, etag: Option<String>) -> Self {
        Self {
            last_modified: last_modified.filter(|v| !v.is_empty()),
            etag: etag.filter(|v| !v.is_empty()),
        }
    }

    /// Fresh values win; anything the server omitted keeps its previous value.
    pub fn or(self, previous: &Validators) -> Validators {
        Validators {
            last_modified: self.last_modified.or_else(|| previous.last_modified.clone()),
            etag: self.etag.or_else(|| previous.etag.clone()),
        }
    }
}

/// Per-feed poll state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMetadata {
    pub feed_url: String,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub last_checked: DateTime<Utc>,
    /// HTTP status of the last attempt, 0 when no response was received.
    pub last_poll_status: u16,
    pub next_check_after: Option<DateTime<Utc>>,
    pub error_count: u32,
}

impl FeedMetadata {
    pub fn validators(&self) -> Validators {
        Validators::new(self.last_modified.clone(), self.etag.clone())
    }
}
