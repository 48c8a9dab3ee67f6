//! `lalabot models` — List the models the configured backend offers.

use lalabot_config::AppConfig;
use lalabot_core::provider::Provider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = lalabot_providers::router::build_from_config(&config, super::http_client()?);

    println!("🤖 Models on {} ({})", config.model.provider, config.model.base_url);
    println!();

    let models = router.list_models().await?;
    if models.is_empty() {
        println!("  (none reported)");
    }
    for model in &models {
        let mut tags = Vec::new();
        if *model == config.model.default_model {
            tags.push("default");
        }
        if *model == config.model.vision_model {
            tags.push("vision");
        }
        if tags.is_empty() {
            println!("  • {model}");
        } else {
            println!("  • {model}  [{}]", tags.join(", "));
        }
    }

    Ok(())
}
