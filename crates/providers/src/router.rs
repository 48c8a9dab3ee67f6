//! Provider router — selects the model backend based on config.
//!
//! The router is itself a `Provider`: every call goes to the default
//! backend, so the agent never needs to know which one is configured.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lalabot_core::error::ProviderError;
use lalabot_core::provider::*;

use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes model requests to the configured backend.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(&self.default_provider)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(self.default_provider.clone()))
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

#[async_trait]
impl Provider for ProviderRouter {
    fn name(&self) -> &str {
        &self.default_provider
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.default_provider()?.stream(request).await
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.default_provider()?.complete(request).await
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.default_provider()?.list_models().await
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.default_provider()?.health_check().await
    }
}

/// Build the router from configuration, sharing `client` with the backend.
pub fn build_from_config(
    config: &lalabot_config::AppConfig,
    client: reqwest::Client,
) -> ProviderRouter {
    let model = &config.model;
    let timeout = Duration::from_secs(model.request_timeout_secs);
    let mut router = ProviderRouter::new(&model.provider);

    let provider: Arc<dyn Provider> = match model.provider.as_str() {
        "openai" => Arc::new(OpenAiCompatProvider::new(
            "openai",
            &model.base_url,
            model.api_key.clone().unwrap_or_default(),
            client,
            timeout,
        )),
        _ => Arc::new(OllamaProvider::new(&model.base_url, client, timeout)),
    };

    router.register(model.provider.clone(), provider);
    router
}
