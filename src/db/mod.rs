mod repository;
mod schema;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FeedMetadata, SentItem};

pub use repository::Repository;

/// Durable delivery and poll state. The only writer of persisted rows.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn is_item_sent(&self, feed_url: &str, item_guid: &str) -> Result<bool>;

    /// Records an item as sent. Returns `false` if it was already recorded.
    async fn mark_item_sent(&self, item: &SentItem) -> Result<bool>;

    async fn has_any_items_for_feed(&self, feed_url: &str) -> Result<bool>;

    async fn get_feed_metadata(&self, feed_url: &str) -> Result<Option<FeedMetadata>>;

    async fn upsert_feed_metadata(&self, metadata: &FeedMetadata) -> Result<()>;

    async fn sent_count(&self) -> Result<u64>;
}
