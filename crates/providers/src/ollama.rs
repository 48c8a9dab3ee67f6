//! Ollama provider using the native `/api/chat` endpoint.
//!
//! Ollama streams newline-delimited JSON objects:
//! `{"message":{"role":"assistant","content":"..."},"done":false}`
//! followed by a final object with `"done": true`. Images travel as base64
//! strings on the message they belong to.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lalabot_core::error::ProviderError;
use lalabot_core::message::{Message, Role};
use lalabot_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{LineBuffer, check_status, network_error};

/// A provider talking to a local or remote Ollama server.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaProvider {
    /// `base_url` includes the `/api` prefix, e.g. `http://localhost:11434/api`.
    pub fn new(base_url: impl Into<String>, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    /// Convert our messages to Ollama's format, attaching `images` to the
    /// last user message.
    fn to_api_messages(messages: &[Message], images: &[String]) -> Vec<ApiMessage> {
        let last_user = messages.iter().rposition(|m| m.role == Role::User);
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                images: if Some(i) == last_user && !images.is_empty() {
                    Some(images.to_vec())
                } else {
                    None
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages, &request.images),
            "stream": true,
            "options": { "temperature": request.temperature },
        })
    }
}

/// Decode one NDJSON line into a chunk. Blank or unparseable lines yield `None`.
pub(crate) fn parse_line(line: &str) -> Option<Result<StreamChunk, ProviderError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatChunk>(line) {
        Ok(ChatChunk {
            error: Some(error), ..
        }) => Some(Err(ProviderError::StreamInterrupted(error))),
        Ok(chunk) => {
            let content = chunk.message.map(|m| m.content).filter(|c| !c.is_empty());
            Some(Ok(StreamChunk {
                content,
                done: chunk.done,
            }))
        }
        Err(e) => {
            trace!(line, error = %e, "Ignoring unparseable NDJSON line");
            None
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            images = request.images.len(),
            "Sending Ollama chat request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status("ollama", response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Spawn task to read the NDJSON byte stream and forward chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(network_error(e))).await;
                        return;
                    }
                };
                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    let Some(parsed) = parse_line(&line) else {
                        continue;
                    };
                    let finished = matches!(&parsed, Ok(c) if c.done) || parsed.is_err();
                    if tx.send(parsed).await.is_err() {
                        return; // receiver dropped
                    }
                    if finished {
                        return;
                    }
                }
            }

            if let Some(parsed) = lines.finish().as_deref().and_then(parse_line) {
                let finished = matches!(&parsed, Ok(c) if c.done);
                let _ = tx.send(parsed).await;
                if finished {
                    return;
                }
            }

            // Stream ended without a done marker
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status("ollama", response).await?;

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(network_error)?;

        Ok(response.status().is_success())
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
