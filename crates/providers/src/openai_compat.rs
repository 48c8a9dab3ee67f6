//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, vLLM, llama.cpp server, Ollama's `/v1`
//! endpoint and any other `/chat/completions` server that streams SSE.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lalabot_core::error::ProviderError;
use lalabot_core::message::{Message, Role};
use lalabot_core::provider::*;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::{LineBuffer, check_status, network_error};

/// An OpenAI-compatible streaming provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            timeout,
        }
    }

    /// Convert our messages to the chat-completions format.
    ///
    /// Images become `image_url` parts (data URIs) on the last user message.
    fn to_api_messages(messages: &[Message], images: &[String]) -> Vec<Value> {
        let last_user = messages.iter().rposition(|m| m.role == Role::User);
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                // Tool results carry no call id in the text protocol, so they
                // are replayed as user turns.
                let role = match m.role {
                    Role::Tool => "user",
                    other => other.as_str(),
                };
                if Some(i) == last_user && !images.is_empty() {
                    let mut parts = vec![json!({ "type": "text", "text": m.content })];
                    parts.extend(images.iter().map(|b64| {
                        json!({
                            "type": "image_url",
                            "image_url": { "url": format!("data:image/jpeg;base64,{b64}") },
                        })
                    }));
                    json!({ "role": role, "content": parts })
                } else {
                    json!({ "role": role, "content": m.content })
                }
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> Value {
        json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages, &request.images),
            "temperature": request.temperature,
            "stream": true,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }
}

/// What one SSE line means for the stream.
#[derive(Debug)]
pub(crate) enum SseLine {
    Chunk(StreamChunk),
    Done,
    Skip,
}

/// Decode one SSE line.
pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    // Skip empty lines and SSE comments
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();

    // "[DONE]" signals end of stream
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            let Some(choice) = resp.choices.into_iter().next() else {
                return SseLine::Skip;
            };
            let content = choice.delta.content.filter(|c| !c.is_empty());
            if content.is_none() && choice.finish_reason.is_none() {
                return SseLine::Skip;
            }
            SseLine::Chunk(StreamChunk {
                content,
                done: false,
            })
        }
        Err(e) => {
            trace!(data, error = %e, "Ignoring unparseable SSE chunk");
            SseLine::Skip
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .authorized(self.client.post(&url))
            .timeout(self.timeout)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(&self.name, response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    match parse_sse_line(&line) {
                        SseLine::Chunk(chunk) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseLine::Done => {
                            let _ = tx.send(Ok(StreamChunk::done())).await;
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            // Stream ended without [DONE] — send final chunk
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(&self.name, response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(network_error)?;

        Ok(response.status().is_success())
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
