//! `lalabot onboard` — First-time setup.

use lalabot_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🐾 Lala — First-Time Setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Put your Telegram token in .env as BOT_TOKEN=...");
    println!("      (optional: WEATHER_API_KEY, NEWS_API_KEY)");
    println!("   2. Make sure Ollama is running and the models are pulled:");
    println!("      ollama pull qwen2:7b && ollama pull llava:latest");
    println!("   3. Check everything with: lalabot doctor");
    println!("   4. Start the bot:        lalabot run");
    println!("      or chat locally:      lalabot chat");

    Ok(())
}
