use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{Instant, MissedTickBehavior};

use crate::db::FeedStore;
use crate::error::Result;
use crate::feed::FeedSource;
use crate::models::{FeedMetadata, PollOutcome, Validators};
use crate::notify::Notifier;

use super::delivery::{Delivery, DeliveryReport};
use super::PollerSettings;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Totals for one pass over every configured feed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub feeds_checked: usize,
    pub feeds_skipped: usize,
    pub items_found: usize,
    pub notifications_sent: usize,
    /// First-run backlog recorded without a notification.
    pub items_suppressed: usize,
    pub errors: usize,
    /// All-time count of recorded items, when the store could report it.
    pub total_sent: Option<u64>,
}

#[derive(Debug, Default)]
struct FeedReport {
    polled: bool,
    fetch_failed: bool,
    items_found: usize,
    delivery: DeliveryReport,
}

impl FeedReport {
    fn skipped() -> Self {
        Self::default()
    }

    fn polled() -> Self {
        Self {
            polled: true,
            ..Self::default()
        }
    }
}

/// Earliest time a feed may be polled again. `next_check_after` is
/// authoritative; rows written before it existed fall back to `last_checked`.
pub fn next_eligible_poll(metadata: &FeedMetadata, standard_interval: TimeDelta) -> DateTime<Utc> {
    metadata
        .next_check_after
        .unwrap_or(metadata.last_checked + standard_interval)
}

/// Drives the per-feed poll state machine over the configured feed list.
pub struct Poller<S, F, N> {
    settings: PollerSettings,
    store: S,
    fetcher: F,
    notifier: N,
}

impl<S: FeedStore, F: FeedSource, N: Notifier> Poller<S, F, N> {
    pub fn new(settings: PollerSettings, store: S, fetcher: F, notifier: N) -> Self {
        Self {
            settings,
            store,
            fetcher,
            notifier,
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs a cycle on every tick until `shutdown` resolves and returns the
    /// number of cycles run. Shutdown is only observed between cycles, so an
    /// in-flight cycle always completes.
    pub async fn run_until<Fut>(&self, tick: Duration, shutdown: Fut) -> usize
    where
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);
        let mut cycles = 0;
        tracing::info!(tick = ?tick, "Scheduler started");

        loop {
            // Polling `shutdown` first lets it register before the first cycle
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!(cycles, "Shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    cycles += 1;
                }
                _ = heartbeat.tick() => {
                    tracing::info!(cycles, "Application is running");
                }
            }
        }

        cycles
    }

    /// Polls every feed in order. A failing feed is logged and counted; it never
    /// stops the remaining feeds.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        tracing::info!(feeds = self.settings.feeds.len(), "Checking feeds");
        let mut report = CycleReport::default();

        for feed_url in &self.settings.feeds {
            match self.poll_feed(feed_url, now).await {
                Ok(feed) => {
                    if feed.polled {
                        report.feeds_checked += 1;
                    } else {
                        report.feeds_skipped += 1;
                    }
                    report.items_found += feed.items_found;
                    report.notifications_sent += feed.delivery.delivered;
                    report.items_suppressed += feed.delivery.suppressed;
                    report.errors += feed.delivery.failed + usize::from(feed.fetch_failed);
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(feed = %feed_url, error = %e, "Failed to process feed");
                }
            }
        }

        report.total_sent = match self.store.sent_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count sent items");
                None
            }
        };

        tracing::info!(
            checked = report.feeds_checked,
            skipped = report.feeds_skipped,
            items = report.items_found,
            sent = report.notifications_sent,
            suppressed = report.items_suppressed,
            errors = report.errors,
            total_sent = ?report.total_sent,
            "Done checking feeds"
        );

        report
    }

    async fn poll_feed(&self, feed_url: &str, now: DateTime<Utc>) -> Result<FeedReport> {
        let metadata = self.store.get_feed_metadata(feed_url).await?;

        if let Some(metadata) = &metadata {
            let eligible = next_eligible_poll(metadata, self.settings.backoff.standard_interval());
            if now < eligible {
                tracing::debug!(feed = feed_url, next_check = %eligible, "Skipping, not due yet");
                return Ok(FeedReport::skipped());
            }
        }

        let cached = metadata
            .as_ref()
            .map(FeedMetadata::validators)
            .unwrap_or_default();
        let previous_errors = metadata.as_ref().map_or(0, |m| m.error_count);

        tracing::debug!(feed = feed_url, "Fetching");
        let outcome = self.fetcher.fetch(feed_url, &cached).await;
        let mut report = FeedReport::polled();

        match outcome {
            PollOutcome::NotModified { status, validators } => {
                self.record_success(feed_url, validators.or(&cached), status, now)
                    .await?;
                tracing::info!(feed = feed_url, "Not modified");
            }
            PollOutcome::Success {
                feed_title,
                items,
                validators,
                status,
            } => {
                self.record_success(feed_url, validators.or(&cached), status, now)
                    .await?;
                report.items_found = items.len();
                tracing::info!(feed = feed_url, title = %feed_title, items = items.len(), "Fetched feed");

                if items.is_empty() {
                    return Ok(report);
                }

                let delivery = Delivery::new(&self.store, &self.notifier, self.settings.send_delay);
                report.delivery = if self.store.has_any_items_for_feed(feed_url).await? {
                    delivery.unsent(feed_url, &feed_title, &items, now).await?
                } else {
                    delivery.first_run(feed_url, &feed_title, &items, now).await?
                };
            }
            failure => {
                report.fetch_failed = true;
                self.record_failure(feed_url, cached, previous_errors, &failure, now)
                    .await?;
            }
        }

        Ok(report)
    }

    async fn record_success(
        &self,
        feed_url: &str,
        validators: Validators,
        status: u16,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let metadata = FeedMetadata {
            feed_url: feed_url.to_string(),
            last_modified: validators.last_modified,
            etag: validators.etag,
            last_checked: now,
            last_poll_status: status,
            next_check_after: Some(now + self.settings.backoff.standard_interval()),
            error_count: 0,
        };
        self.store.upsert_feed_metadata(&metadata).await
    }

    /// Bumps the failure count and schedules the retry. Cached validators are
    /// carried over unchanged.
    async fn record_failure(
        &self,
        feed_url: &str,
        cached: Validators,
        previous_errors: u32,
        outcome: &PollOutcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let error_count = previous_errors.saturating_add(1);
        let next_check = self
            .settings
            .backoff
            .next_poll_time(outcome, error_count, now);

        match outcome {
            PollOutcome::Gone { status } => {
                tracing::warn!(feed = feed_url, status, next_check = %next_check, "Feed is gone, disabling it");
            }
            PollOutcome::RateLimited {
                status,
                retry_after,
            } => {
                tracing::warn!(
                    feed = feed_url,
                    status,
                    retry_after = retry_after.as_deref().unwrap_or(""),
                    error_count,
                    next_check = %next_check,
                    "Rate limited"
                );
            }
            PollOutcome::TransientFailure { status, error, .. } => {
                tracing::warn!(
                    feed = feed_url,
                    status = ?status,
                    error = %error,
                    error_count,
                    next_check = %next_check,
                    "Error fetching feed"
                );
            }
            PollOutcome::Success { .. } | PollOutcome::NotModified { .. } => {}
        }

        let metadata = FeedMetadata {
            feed_url: feed_url.to_string(),
            last_modified: cached.last_modified,
            etag: cached.etag,
            last_checked: now,
            last_poll_status: outcome.status_code(),
            next_check_after: Some(next_check),
            error_count,
        };
        self.store.upsert_feed_metadata(&metadata).await
    }
}
