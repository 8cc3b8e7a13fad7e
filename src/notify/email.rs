use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{MailCredentials, SmtpConfig};
use crate::error::{AppError, Result};

use super::{Notification, Notifier, NotifyError};

/// Sends notifications as multipart emails over authenticated STARTTLS SMTP.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig, credentials: &MailCredentials) -> Result<Self> {
        let from = credentials
            .from_address()
            .parse::<Mailbox>()
            .map_err(|e| AppError::Mail(format!("invalid sender address: {e}")))?;
        let to = credentials
            .recipient
            .parse::<Mailbox>()
            .map_err(|e| AppError::Mail(format!("invalid recipient address: {e}")))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .map_err(|e| AppError::Mail(format!("invalid SMTP host {}: {e}", smtp.host)))?
            .port(smtp.port)
            .credentials(Credentials::new(
                credentials.username.clone(),
                credentials.password.clone(),
            ))
            .build();

        Ok(Self { mailer, from, to })
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notification.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                notification.text_body.clone(),
                notification.html_body.clone(),
            ))?;

        self.mailer.send(message).await?;
        Ok(())
    }
}
