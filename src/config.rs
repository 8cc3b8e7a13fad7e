use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::{AppError, Result};

const APP_DIR: &str = "rss-email";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub feeds: Vec<String>,

    /// Standard interval between polls of one feed; the base for failure backoff.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u32,

    /// How often the scheduler wakes to look for feeds that are due.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_minutes: u32,

    /// Pause after each delivered email.
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,

    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
        }
    }
}

/// SMTP login and recipient identity, read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct MailCredentials {
    pub username: String,
    pub password: String,
    pub recipient: String,
    pub from: Option<String>,
}

impl std::fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("recipient", &self.recipient)
            .field("from", &self.from)
            .finish()
    }
}

impl MailCredentials {
    pub const USERNAME_VAR: &'static str = "SMTP_USERNAME";
    pub const PASSWORD_VAR: &'static str = "SMTP_PASSWORD";
    pub const RECIPIENT_VAR: &'static str = "RECIPIENT_EMAIL";
    pub const FROM_VAR: &'static str = "SMTP_FROM";

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let username = get(Self::USERNAME_VAR);
        let password = get(Self::PASSWORD_VAR);
        let recipient = get(Self::RECIPIENT_VAR);

        match (username, password, recipient) {
            (Some(username), Some(password), Some(recipient)) => Ok(Self {
                username,
                password,
                recipient,
                from: get(Self::FROM_VAR),
            }),
            (username, password, recipient) => {
                let missing: Vec<&str> = [
                    (Self::USERNAME_VAR, username.is_none()),
                    (Self::PASSWORD_VAR, password.is_none()),
                    (Self::RECIPIENT_VAR, recipient.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(AppError::Config(format!(
                    "missing required environment variables: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    pub fn from_address(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("rss_email.db")
        .to_string_lossy()
        .to_string()
}

fn default_poll_interval() -> u32 {
    60
}

fn default_tick_interval() -> u32 {
    5
}

fn default_send_delay() -> u64 {
    1000
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            feeds: Vec::new(),
            poll_interval_minutes: default_poll_interval(),
            tick_interval_minutes: default_tick_interval(),
            send_delay_ms: default_send_delay(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when none is given. A missing default
    /// file is created from defaults, which then fails validation for lack of feeds.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::read(&default_path)?
                } else {
                    let config = Config::default();
                    config.save(&default_path)?;
                    tracing::warn!(path = %default_path.display(), "Wrote default config");
                    config
                }
            }
        };

        config.validate()
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Trims feed URLs, drops blanks and duplicates, and rejects anything that
    /// is not an http(s) URL.
    pub fn validate(mut self) -> Result<Self> {
        let mut feeds: Vec<String> = Vec::with_capacity(self.feeds.len());
        for raw in &self.feeds {
            let feed = raw.trim();
            if feed.is_empty() {
                tracing::warn!("Skipping empty feed URL");
                continue;
            }
            let url = Url::parse(feed)
                .map_err(|e| AppError::Config(format!("invalid feed URL {feed:?}: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::Config(format!(
                    "feed URL {feed:?} must use http or https"
                )));
            }
            if feeds.iter().any(|f| f == feed) {
                tracing::warn!(feed, "Ignoring duplicate feed URL");
                continue;
            }
            feeds.push(feed.to_string());
        }

        if feeds.is_empty() {
            return Err(AppError::Config(format!(
                "no feeds configured; add them to {}",
                Self::config_path().display()
            )));
        }
        if self.poll_interval_minutes == 0 {
            return Err(AppError::Config(
                "poll_interval_minutes must be greater than zero".to_string(),
            ));
        }
        if self.tick_interval_minutes == 0 {
            return Err(AppError::Config(
                "tick_interval_minutes must be greater than zero".to_string(),
            ));
        }

        self.feeds = feeds;
        Ok(self)
    }

    pub fn standard_interval(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::minutes(i64::from(self.poll_interval_minutes))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.tick_interval_minutes) * 60)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}
