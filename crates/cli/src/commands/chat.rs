//! `lalabot chat` — Talk to Lala in the terminal.

use std::sync::Arc;

use lalabot_channels::CliChannel;
use lalabot_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         Lala — Interactive Terminal Chat      ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.model.provider);
    println!("  Model:     {}", config.model.default_model);
    println!("  Vision:    {}", config.model.vision_model);
    println!();
    println!("  Type your message and press Enter.");
    println!("  /photo <path> sends an image; /reset, /model, /persona work too.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let http = super::http_client()?;
    let handler = super::build_handler(&config, http)?;
    super::serve(handler, Arc::new(CliChannel::new())).await?;

    println!();
    println!("  Bye bye! 👋");
    println!();
    Ok(())
}
