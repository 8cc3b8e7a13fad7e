mod email;
mod template;

use async_trait::async_trait;
use thiserror::Error;

pub use email::SmtpMailer;
pub use template::render;

/// A rendered notification for a single feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("failed to send message: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Transmits notifications to the configured recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}
