//! `lalabot run` — Serve the Telegram bot.

use std::sync::Arc;

use lalabot_channels::{TelegramChannel, TelegramConfig};
use lalabot_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let Some(telegram) = TelegramConfig::from_app(&config) else {
        eprintln!();
        eprintln!("  ERROR: No Telegram bot token configured!");
        eprintln!();
        eprintln!("  Set the BOT_TOKEN environment variable (or put it in .env),");
        eprintln!("  or add it to your config file under [telegram]:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No bot token found. See above for setup instructions.".into());
    };

    let http = super::http_client()?;
    let handler = super::build_handler(&config, http.clone())?;
    let channel = Arc::new(TelegramChannel::new(telegram, http));

    tracing::info!("Lala is starting (long polling)...");
    super::serve(handler, channel).await
}
