use std::path::PathBuf;

use anyhow::Context;

mod config;
mod db;
mod error;
mod feed;
mod models;
mod notify;
mod poll;

use config::{Config, MailCredentials};
use db::Repository;
use error::{AppError, Result};
use feed::FeedFetcher;
use notify::SmtpMailer;
use poll::{Poller, PollerSettings};

struct Args {
    config_path: Option<PathBuf>,
    once: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config_path: None,
        once: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| AppError::Config("--config requires a path".to_string()))?;
                args.config_path = Some(PathBuf::from(path));
            }
            "--once" => args.once = true,
            other => {
                return Err(AppError::Config(format!(
                    "unknown argument {other:?} (usage: rss-email [--config PATH] [--once])"
                )))
            }
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("RSS to Email service starting");

    let args = parse_args()?;

    // Secrets may also come from a .env file in the working directory
    dotenvy::dotenv().ok();

    let config = Config::load(args.config_path.as_deref()).context("failed to load configuration")?;
    let credentials = MailCredentials::from_env().context("failed to load mail credentials")?;

    let repository = Repository::new(&config.db_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.db_path))?;
    let fetcher = FeedFetcher::new()?;
    let mailer = SmtpMailer::new(&config.smtp, &credentials)?;

    tracing::info!(
        feeds = config.feeds.len(),
        poll_interval_minutes = config.poll_interval_minutes,
        tick_interval_minutes = config.tick_interval_minutes,
        "Loaded configuration"
    );

    let poller = Poller::new(PollerSettings::from(&config), repository, fetcher, mailer);

    if args.once {
        poller.run_cycle().await;
        return Ok(());
    }

    poller
        .run_until(config.tick_interval(), shutdown_signal())
        .await;

    tracing::info!("RSS to Email service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
