mod config;
mod mail;
mod platform;
mod relay;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::mail::Sendmail;
use crate::relay::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telegram_mail_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A .env next to the binary is optional; real env vars win.
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Configuration loaded successfully");
    info!("  Session: {}", config.telegram.session_path().display());
    info!("  Target chats: {:?}", config.telegram.target_chat_ids);
    info!("  Forwarding to: {}", config.mail.address);
    info!("  Mail command: {} -t", config.mail.command);

    let mailer = Sendmail::new(config.mail.command.clone(), config.mail.address.clone());
    let relay = Relay::new(Arc::new(mailer));

    info!("Relay is starting...");
    platform::telegram::run(&config.telegram, relay).await?;

    Ok(())
}
