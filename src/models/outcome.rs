use thiserror::Error;

use super::{FeedItem, Validators};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("unexpected status code: {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to parse feed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// Result of one fetch attempt against a feed.
#[derive(Debug)]
pub enum PollOutcome {
    Success {
        feed_title: String,
        items: Vec<FeedItem>,
        validators: Validators,
        status: u16,
    },
    NotModified {
        status: u16,
        validators: Validators,
    },
    RateLimited {
        status: u16,
        retry_after: Option<String>,
    },
    Gone {
        status: u16,
    },
    TransientFailure {
        status: Option<u16>,
        retry_after: Option<String>,
        error: FetchError,
    },
}

impl PollOutcome {
    /// Status recorded in feed metadata; 0 when the request never got a response.
    pub fn status_code(&self) -> u16 {
        match self {
            PollOutcome::Success { status, .. }
            | PollOutcome::NotModified { status, .. }
            | PollOutcome::RateLimited { status, .. }
            | PollOutcome::Gone { status } => *status,
            PollOutcome::TransientFailure { status, .. } => status.unwrap_or(0),
        }
    }

    pub fn retry_after(&self) -> Option<&str> {
        match self {
            PollOutcome::RateLimited { retry_after, .. }
            | PollOutcome::TransientFailure { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}
