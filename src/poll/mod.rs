mod backoff;
mod delivery;
mod orchestrator;

use std::time::Duration;

use crate::config::Config;

pub use backoff::BackoffPolicy;
pub use orchestrator::{CycleReport, Poller};

/// Immutable inputs to the poll loop, fixed at startup.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub feeds: Vec<String>,
    pub backoff: BackoffPolicy,
    pub send_delay: Duration,
}

impl From<&Config> for PollerSettings {
    fn from(config: &Config) -> Self {
        Self {
            feeds: config.feeds.clone(),
            backoff: BackoffPolicy::new(config.standard_interval()),
            send_delay: config.send_delay(),
        }
    }
}
