//! Model client: the orchestrator's view of the model backend.
//!
//! Backend failures never abort a turn. They surface as one in-band
//! fragment the user can read, and the turn carries on.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use lalabot_core::message::Message;
use lalabot_core::provider::{ChunkReceiver, Provider, ProviderRequest};
use tracing::{debug, warn};

use crate::stream::Fragments;

/// Shown in place of an answer when the backend fails.
pub const BACKEND_ERROR_FRAGMENT: &str = "⚠️ The model backend returned an error.";

pub struct ModelClient {
    provider: Arc<dyn Provider>,
    temperature: f32,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn Provider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    fn request(&self, model: &str, messages: Vec<Message>, image: Option<String>) -> ProviderRequest {
        let request = ProviderRequest::new(model, messages).with_temperature(self.temperature);
        match image {
            Some(b64) => request.with_image(b64),
            None => request,
        }
    }

    /// One complete answer. Errors become the backend-error text.
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
        image: Option<String>,
    ) -> String {
        let request = self.request(model, messages, image);
        match self.provider.complete(request).await {
            Ok(response) => {
                debug!(model, chars = response.message.content.len(), "Model answered");
                response.message.content
            }
            Err(e) => {
                warn!(provider = self.provider.name(), model, error = %e, "Model request failed");
                BACKEND_ERROR_FRAGMENT.to_string()
            }
        }
    }

    /// A streaming answer. A failure before or during the stream ends it
    /// with the backend-error fragment.
    pub async fn stream(&self, model: &str, messages: Vec<Message>) -> Fragments {
        let request = self.request(model, messages, None);
        match self.provider.stream(request).await {
            Ok(rx) => receiver_fragments(rx),
            Err(e) => {
                warn!(provider = self.provider.name(), model, error = %e, "Model stream failed to start");
                stream::once(async { BACKEND_ERROR_FRAGMENT.to_string() }).boxed()
            }
        }
    }
}

/// Adapt a provider's chunk channel into fragments.
fn receiver_fragments(rx: ChunkReceiver) -> Fragments {
    stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        loop {
            match rx.recv().await {
                Some(Ok(chunk)) if chunk.done => return chunk.content.map(|text| (text, None)),
                Some(Ok(chunk)) => {
                    if let Some(text) = chunk.content {
                        return Some((text, Some(rx)));
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Model stream interrupted");
                    return Some((BACKEND_ERROR_FRAGMENT.to_string(), None));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use lalabot_core::error::ProviderError;

    #[tokio::test]
    async fn complete_returns_the_text() {
        let provider = Arc::new(ScriptedProvider::new(vec!["你好！"]));
        let client = ModelClient::new(provider.clone(), 0.5);
        let text = client.complete("qwen2:7b", vec![Message::user("hi")], None).await;
        assert_eq!(text, "你好！");

        let request = &provider.requests()[0];
        assert_eq!(request.model, "qwen2:7b");
        assert!(request.images.is_empty());
    }

    #[tokio::test]
    async fn image_is_attached() {
        let provider = Arc::new(ScriptedProvider::new(vec!["a cat"]));
        let client = ModelClient::new(provider.clone(), 0.5);
        client
            .complete("llava:latest", vec![Message::user("look")], Some("QUJD".into()))
            .await;
        assert_eq!(provider.requests()[0].images, vec!["QUJD".to_string()]);
    }

    #[tokio::test]
    async fn backend_error_becomes_in_band_text() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::ApiError {
            status_code: 500,
            message: "boom".into(),
        }));
        let client = ModelClient::new(provider, 0.5);
        assert_eq!(client.complete("m", vec![], None).await, BACKEND_ERROR_FRAGMENT);

        let fragments: Vec<String> = client.stream("m", vec![]).await.collect().await;
        assert_eq!(fragments, vec![BACKEND_ERROR_FRAGMENT.to_string()]);
    }

    #[tokio::test]
    async fn stream_yields_fragments_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec!["Hello, world"]).with_fragment_size(3));
        let client = ModelClient::new(provider, 0.5);
        let fragments: Vec<String> = client.stream("m", vec![]).await.collect().await;
        assert_eq!(fragments, vec!["Hel", "lo,", " wo", "rld"]);
    }

    #[tokio::test]
    async fn interrupted_stream_ends_with_error_fragment() {
        let provider = Arc::new(ScriptedProvider::interrupted("partial answer"));
        let client = ModelClient::new(provider, 0.5);
        let text: String = client.stream("m", vec![]).await.collect::<Vec<_>>().await.concat();
        assert_eq!(text, format!("partial answer{BACKEND_ERROR_FRAGMENT}"));
    }
}
