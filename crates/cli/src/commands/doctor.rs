//! `lalabot doctor` — Diagnose configuration and backend health.

use lalabot_config::AppConfig;
use lalabot_core::provider::Provider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Lala Doctor — System Diagnostics");
    println!("==================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found");
    } else {
        println!("  ⚠️  No config file — using defaults (run `lalabot onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the configuration before running other checks.");
            return Ok(());
        }
    };

    if config.has_bot_token() {
        println!("  ✅ Telegram bot token configured");
    } else {
        println!("  ⚠️  No BOT_TOKEN — `lalabot run` will refuse to start");
        issues += 1;
    }

    if config.persona_has_tool_protocol() {
        println!("  ✅ Persona teaches the tool protocol");
    } else {
        println!("  ⚠️  Persona never mentions \"tool_name\" — tools will not be called");
        issues += 1;
    }

    for (name, key) in [
        ("Weather", &config.tools.weather_api_key),
        ("News", &config.tools.news_api_key),
    ] {
        if key.is_some() {
            println!("  ✅ {name} API key configured");
        } else {
            println!("  ⚠️  No {name} API key — that tool will explain it is not set up");
        }
    }

    let router = lalabot_providers::router::build_from_config(&config, super::http_client()?);
    match router.health_check().await {
        Ok(true) => {
            println!("  ✅ Model backend reachable at {}", config.model.base_url);
            match router.list_models().await {
                Ok(models) => {
                    for wanted in [&config.model.default_model, &config.model.vision_model] {
                        if models.iter().any(|m| m == wanted) {
                            println!("  ✅ Model {wanted} available");
                        } else {
                            println!("  ⚠️  Model {wanted} not found on the backend");
                            issues += 1;
                        }
                    }
                }
                Err(e) => {
                    println!("  ⚠️  Could not list models: {e}");
                    issues += 1;
                }
            }
        }
        Ok(false) | Err(_) => {
            println!("  ❌ Model backend not reachable at {}", config.model.base_url);
            issues += 1;
        }
    }

    if config.store.backend == "file" {
        println!("  ✅ Conversation state stored in {}", config.store_path().display());
    } else {
        println!("  ⚠️  Conversation state is kept in memory only");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
