use chrono::{DateTime, TimeDelta, Utc};

use crate::models::PollOutcome;

pub const DEFAULT_STANDARD_INTERVAL_MINUTES: i64 = 60;
const MAX_BACKOFF_HOURS: i64 = 24;
/// A retired feed is parked for a year, which in practice disables it.
const GONE_DELAY_DAYS: i64 = 365;

/// Maps a poll outcome to the earliest time the feed may be polled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    standard_interval: TimeDelta,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(TimeDelta::minutes(DEFAULT_STANDARD_INTERVAL_MINUTES))
    }
}

impl BackoffPolicy {
    pub fn new(standard_interval: TimeDelta) -> Self {
        Self { standard_interval }
    }

    pub fn standard_interval(&self) -> TimeDelta {
        self.standard_interval
    }

    /// `error_count` is the consecutive-failure count including this attempt.
    pub fn next_poll_time(
        &self,
        outcome: &PollOutcome,
        error_count: u32,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match outcome {
            PollOutcome::Gone { .. } => now + TimeDelta::days(GONE_DELAY_DAYS),
            PollOutcome::Success { .. } | PollOutcome::NotModified { .. } => {
                now + self.standard_interval
            }
            PollOutcome::RateLimited { .. } | PollOutcome::TransientFailure { .. } => {
                // A hint too far out to represent is ignored like a malformed one
                outcome
                    .retry_after()
                    .and_then(|value| parse_retry_after(value, now))
                    .and_then(|delay| now.checked_add_signed(delay))
                    .unwrap_or_else(|| now + self.failure_backoff(error_count))
            }
        }
    }

    /// `standard * 2^(errors - 1)`, kept within `[standard, 24h]`.
    pub fn failure_backoff(&self, error_count: u32) -> TimeDelta {
        let ceiling = TimeDelta::hours(MAX_BACKOFF_HOURS).max(self.standard_interval);
        let exponent = error_count.saturating_sub(1).min(30);

        self.standard_interval
            .checked_mul(1i32 << exponent)
            .unwrap_or(ceiling)
            .clamp(self.standard_interval, ceiling)
    }
}

/// Parses a `Retry-After` value: delay in seconds, or an HTTP date.
/// Returns `None` unless the result is a positive delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let delay = match value.parse::<i64>() {
        Ok(seconds) => TimeDelta::try_seconds(seconds)?,
        Err(_) => DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc) - now,
    };

    (delay > TimeDelta::zero()).then_some(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchError, Validators};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn transient(retry_after: Option<&str>) -> PollOutcome {
        PollOutcome::TransientFailure {
            status: Some(503),
            retry_after: retry_after.map(str::to_string),
            error: FetchError::Status(503),
        }
    }

    fn rate_limited(retry_after: Option<&str>) -> PollOutcome {
        PollOutcome::RateLimited {
            status: 429,
            retry_after: retry_after.map(str::to_string),
        }
    }

    fn delay_minutes(outcome: &PollOutcome, error_count: u32) -> i64 {
        let policy = BackoffPolicy::default();
        (policy.next_poll_time(outcome, error_count, now()) - now()).num_minutes()
    }

    #[test]
    fn consecutive_failures_double_the_delay() {
        let outcome = transient(None);
        assert_eq!(delay_minutes(&outcome, 1), 60);
        assert_eq!(delay_minutes(&outcome, 2), 120);
        assert_eq!(delay_minutes(&outcome, 3), 240);
    }

    #[test]
    fn backoff_is_clamped_to_one_day() {
        assert_eq!(delay_minutes(&transient(None), 10), 1440);
        assert_eq!(delay_minutes(&transient(None), u32::MAX), 1440);
    }

    #[test]
    fn backoff_never_drops_below_standard_interval() {
        assert_eq!(delay_minutes(&transient(None), 0), 60);
    }

    #[test]
    fn retry_after_seconds_override_backoff() {
        let policy = BackoffPolicy::default();
        for errors in [1, 5, 10] {
            let next = policy.next_poll_time(&rate_limited(Some("120")), errors, now());
            assert_eq!(next, now() + TimeDelta::seconds(120));
        }
    }

    #[test]
    fn retry_after_applies_to_transient_failures_too() {
        let policy = BackoffPolicy::default();
        let next = policy.next_poll_time(&transient(Some("30")), 4, now());
        assert_eq!(next, now() + TimeDelta::seconds(30));
    }

    #[test]
    fn retry_after_http_date_is_honored() {
        let policy = BackoffPolicy::default();
        let next = policy.next_poll_time(
            &rate_limited(Some("Sun, 01 Mar 2026 12:45:00 GMT")),
            3,
            now(),
        );
        assert_eq!(next, now() + TimeDelta::minutes(45));
    }

    #[test]
    fn unusable_retry_after_falls_back_to_backoff() {
        assert_eq!(delay_minutes(&rate_limited(Some("soon")), 2), 120);
        assert_eq!(delay_minutes(&rate_limited(Some("0")), 2), 120);
        assert_eq!(delay_minutes(&rate_limited(Some("-5")), 2), 120);
        assert_eq!(
            delay_minutes(&rate_limited(Some("Sun, 01 Mar 2026 11:00:00 GMT")), 2),
            120
        );
        assert_eq!(delay_minutes(&rate_limited(None), 2), 120);
    }

    #[test]
    fn unrepresentable_retry_after_falls_back_to_backoff() {
        assert_eq!(delay_minutes(&rate_limited(Some("10000000000000")), 2), 120);
        assert_eq!(delay_minutes(&transient(Some("9223372036854775")), 3), 240);
        assert_eq!(delay_minutes(&rate_limited(Some("99999999999999999999")), 1), 60);
    }

    #[test]
    fn gone_parks_the_feed_for_a_year() {
        let gone = PollOutcome::Gone { status: 410 };
        for errors in [1, 3, 50] {
            assert!(delay_minutes(&gone, errors) >= 300 * 24 * 60);
        }
    }

    #[test]
    fn success_and_not_modified_use_standard_interval() {
        let success = PollOutcome::Success {
            feed_title: "Feed".into(),
            items: Vec::new(),
            validators: Validators::default(),
            status: 200,
        };
        let not_modified = PollOutcome::NotModified {
            status: 304,
            validators: Validators::default(),
        };
        assert_eq!(delay_minutes(&success, 0), 60);
        assert_eq!(delay_minutes(&not_modified, 0), 60);
    }

    #[test]
    fn custom_standard_interval_scales_backoff() {
        let policy = BackoffPolicy::new(TimeDelta::minutes(15));
        assert_eq!(policy.failure_backoff(1), TimeDelta::minutes(15));
        assert_eq!(policy.failure_backoff(3), TimeDelta::minutes(60));
        assert_eq!(policy.failure_backoff(20), TimeDelta::hours(24));
    }
}
