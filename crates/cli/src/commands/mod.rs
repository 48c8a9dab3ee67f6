pub mod chat;
pub mod doctor;
pub mod models;
pub mod onboard;
pub mod run;

use std::sync::Arc;

use lalabot_agent::{BotHandler, Orchestrator, SessionManager};
use lalabot_config::AppConfig;
use lalabot_core::channel::Channel;
use tokio_util::sync::CancellationToken;

/// The shared outbound client: model backend, tools and Telegram all use it.
pub fn http_client() -> Result<reqwest::Client, Box<dyn std::error::Error>> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("lalabot/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Wire the conversation loop from config.
pub fn build_handler(
    config: &AppConfig,
    http: reqwest::Client,
) -> Result<Arc<BotHandler>, Box<dyn std::error::Error>> {
    let provider = Arc::new(lalabot_providers::router::build_from_config(config, http.clone()));
    let registry = Arc::new(lalabot_tools::default_registry(&config.tools)?);
    let context = lalabot_tools::default_context(&config.tools, http);
    let store = lalabot_store::build_from_config(config);

    tracing::info!(
        provider = %config.model.provider,
        model = %config.model.default_model,
        tools = registry.len(),
        store = store.name(),
        "Bot wired"
    );

    let orchestrator = Orchestrator::from_config(config, provider, registry, context);
    let sessions = SessionManager::new(store, config.conversation.max_rounds);
    Ok(Arc::new(BotHandler::new(Arc::new(orchestrator), Arc::new(sessions))))
}

/// Serve `channel` until it closes or Ctrl-C is pressed.
pub async fn serve(
    handler: Arc<BotHandler>,
    channel: Arc<dyn Channel>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received");
                shutdown.cancel();
            }
        });
    }

    handler.run(channel, shutdown).await?;
    Ok(())
}
