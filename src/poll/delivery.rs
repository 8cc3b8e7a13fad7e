use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::db::FeedStore;
use crate::error::Result;
use crate::models::{FeedItem, SentItem};
use crate::notify::{render, Notifier};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Backlog recorded as sent without a notification.
    pub suppressed: usize,
    pub failed: usize,
}

/// Decides which fetched items to notify about and records them once sent.
pub struct Delivery<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    send_delay: Duration,
}

impl<'a, S: FeedStore, N: Notifier> Delivery<'a, S, N> {
    pub fn new(store: &'a S, notifier: &'a N, send_delay: Duration) -> Self {
        Self {
            store,
            notifier,
            send_delay,
        }
    }

    /// First poll of a feed: notify about the newest entry only and record the
    /// rest of the backlog as sent.
    pub async fn first_run(
        &self,
        feed_url: &str,
        feed_name: &str,
        items: &[FeedItem],
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::default();
        let Some(newest) = most_recent(items) else {
            return Ok(report);
        };

        tracing::info!(
            feed = feed_url,
            title = %newest.title,
            backlog = items.len().saturating_sub(1),
            "New feed detected, sending only the most recent post"
        );

        if self.deliver(feed_url, feed_name, newest, now).await? {
            report.delivered += 1;
        } else {
            report.failed += 1;
        }

        for item in items.iter().filter(|item| item.guid != newest.guid) {
            if self
                .store
                .mark_item_sent(&SentItem::new(feed_url, &item.guid, now))
                .await?
            {
                report.suppressed += 1;
                tracing::debug!(feed = feed_url, title = %item.title, "Marked as sent without notification");
            }
        }

        Ok(report)
    }

    /// Known feed: notify about every entry not yet recorded.
    pub async fn unsent(
        &self,
        feed_url: &str,
        feed_name: &str,
        items: &[FeedItem],
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::default();

        for item in items {
            if self.store.is_item_sent(feed_url, &item.guid).await? {
                tracing::debug!(feed = feed_url, title = %item.title, "Already sent");
                continue;
            }

            if self.deliver(feed_url, feed_name, item, now).await? {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// Returns `false` when transmission failed; the item stays unrecorded so a
    /// later cycle offers it again.
    async fn deliver(
        &self,
        feed_url: &str,
        feed_name: &str,
        item: &FeedItem,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let notification = render(feed_name, item);

        if let Err(e) = self.notifier.send(&notification).await {
            tracing::error!(feed = feed_url, title = %item.title, error = %e, "Failed to send notification");
            return Ok(false);
        }

        self.store
            .mark_item_sent(&SentItem::new(feed_url, &item.guid, now))
            .await?;
        tracing::info!(feed = feed_url, title = %item.title, "Sent");

        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }

        Ok(true)
    }
}

/// The entry with the latest publish time; the first entry when none is dated.
/// Ties go to the earlier entry in feed order.
pub fn most_recent(items: &[FeedItem]) -> Option<&FeedItem> {
    items
        .iter()
        .filter(|item| item.published.is_some())
        .fold(None, |best: Option<&FeedItem>, item| match best {
            Some(b) if b.published >= item.published => Some(b),
            _ => Some(item),
        })
        .or_else(|| items.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(guid: &str, hour: Option<u32>) -> FeedItem {
        FeedItem {
            title: guid.to_uppercase(),
            link: format!("https://example.com/{guid}"),
            guid: guid.to_string(),
            published: hour.map(|h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap()),
            summary: String::new(),
        }
    }

    #[test]
    fn picks_latest_publish_time() {
        let items = vec![item("a", Some(8)), item("c", Some(10)), item("b", Some(9))];
        assert_eq!(most_recent(&items).unwrap().guid, "c");
    }

    #[test]
    fn undated_items_are_ignored_when_any_are_dated() {
        let items = vec![item("undated", None), item("dated", Some(8))];
        assert_eq!(most_recent(&items).unwrap().guid, "dated");
    }

    #[test]
    fn falls_back_to_first_item_without_dates() {
        let items = vec![item("first", None), item("second", None)];
        assert_eq!(most_recent(&items).unwrap().guid, "first");
    }

    #[test]
    fn ties_keep_feed_order() {
        let items = vec![item("first", Some(9)), item("second", Some(9))];
        assert_eq!(most_recent(&items).unwrap().guid, "first");
    }

    #[test]
    fn empty_feed_has_no_candidate() {
        assert!(most_recent(&[]).is_none());
    }
}
