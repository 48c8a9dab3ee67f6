//! Conversation orchestrator: one user turn, start to finish.
//!
//! A text turn is a decision call, then either the decision text itself
//! (no tool needed) or one tool round trip followed by a streaming
//! grounding call. Either way the reply reaches the user through the
//! presenter and lands in history as one round.
//!
//! An image turn is a single call to the vision model.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lalabot_config::AppConfig;
use lalabot_core::channel::{Channel, ImageAttachment, ImageKind};
use lalabot_core::message::Message;
use lalabot_core::provider::Provider;
use lalabot_core::state::ConversationState;
use lalabot_core::tool::{ToolCall, ToolContext, ToolRegistry};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::extract::{extract_candidate_blocks, parse_tool_calls, strip_think};
use crate::model::ModelClient;
use crate::presenter::{Presenter, safe_send};
use crate::prompt::{
    ANIMATED_STICKER_REFUSAL, EMPTY_REPLY_FALLBACK, IMAGE_FAILED, IMAGE_TOO_LARGE, PHOTO_PROMPT,
    SENT_PHOTO, SENT_STICKER, STICKER_PROMPT, grounding_instruction, serialized_call,
};
use crate::stream::{Chunking, rechunk, think_filter};

/// What the decision call asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The decision text, think blocks stripped and trimmed, is the answer.
    NoToolNeeded(String),
    /// Run these tools, then ground a second answer on their results.
    ToolsRequested(Vec<ToolCall>),
}

/// Classify a decision-call answer.
///
/// Any recovered fragment that is not a tool call rejects the whole batch,
/// and the original text is answered as-is.
pub fn decide(decision_text: &str) -> Decision {
    let no_tool = || Decision::NoToolNeeded(strip_think(decision_text).trim().to_string());

    let Some(block) = extract_candidate_blocks(decision_text) else {
        return no_tool();
    };
    match parse_tool_calls(&block) {
        Ok(calls) => Decision::ToolsRequested(calls),
        Err(e) => {
            debug!(error = %e, "Recovered fragments are not tool calls");
            no_tool()
        }
    }
}

fn non_empty(reply: String) -> String {
    if reply.trim().is_empty() {
        EMPTY_REPLY_FALLBACK.to_string()
    } else {
        reply
    }
}

pub struct Orchestrator {
    model: ModelClient,
    dispatcher: Dispatcher,
    presenter: Presenter,
    chunking: Chunking,
    default_persona: String,
    default_model: String,
    vision_model: String,
    image_size_limit: u64,
}

impl Orchestrator {
    pub fn new(
        model: ModelClient,
        dispatcher: Dispatcher,
        default_persona: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            model,
            dispatcher,
            presenter: Presenter::default(),
            chunking: Chunking::default(),
            default_persona: default_persona.into(),
            default_model: default_model.into(),
            vision_model: "llava:latest".into(),
            image_size_limit: 5 * 1024 * 1024,
        }
    }

    /// Wire an orchestrator from the application config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        context: ToolContext,
    ) -> Self {
        let model = ModelClient::new(provider, config.model.temperature);
        let dispatcher = Dispatcher::new(
            registry,
            context,
            Duration::from_secs(config.tools.timeout_secs),
        );
        Self::new(
            model,
            dispatcher,
            config.default_persona.clone(),
            config.model.default_model.clone(),
        )
        .with_presenter(Presenter::new(Duration::from_millis(
            config.conversation.edit_interval_ms,
        )))
        .with_chunking(Chunking::from_config(&config.conversation))
        .with_vision_model(config.model.vision_model.clone())
        .with_image_size_limit(config.conversation.image_size_limit_bytes)
    }

    pub fn with_presenter(mut self, presenter: Presenter) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn with_chunking(mut self, chunking: Chunking) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    pub fn with_image_size_limit(mut self, bytes: u64) -> Self {
        self.image_size_limit = bytes;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn default_persona(&self) -> &str {
        &self.default_persona
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        self.model.provider()
    }

    /// System persona, then history, then the new user turn.
    fn context(&self, state: &ConversationState, turn: Message) -> Vec<Message> {
        let mut messages = Vec::with_capacity(state.history_len() + 2);
        messages.push(Message::system(state.persona_or(&self.default_persona)));
        messages.extend(state.history().cloned());
        messages.push(turn);
        messages
    }

    /// Answer one text message and record the round in `state`.
    pub async fn chat_turn(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        state: &mut ConversationState,
        user_text: &str,
    ) -> String {
        let model = state.model_or(&self.default_model).to_string();
        let mut messages = self.context(state, Message::user(user_text));

        let decision_text = self.model.complete(&model, messages.clone(), None).await;
        debug!(%model, decision = %decision_text, "Decision call answered");

        let fragments = match decide(&decision_text) {
            Decision::NoToolNeeded(answer) => rechunk(&answer, self.chunking),
            Decision::ToolsRequested(calls) => {
                info!(
                    tools = ?calls.iter().map(|c| c.tool_name.as_str()).collect::<Vec<_>>(),
                    "Model requested tools"
                );
                let results = self.dispatcher.dispatch(calls, state).await;
                for result in &results {
                    messages.push(Message::assistant(serialized_call(&result.tool_call)));
                    messages.push(Message::tool(grounding_instruction(result)));
                }
                think_filter(self.model.stream(&model, messages).await, self.chunking)
            }
        };

        let reply = non_empty(self.presenter.present(channel, chat_id, fragments).await);
        state.push_round(user_text, reply.clone());
        reply
    }

    /// Describe a photo or sticker. Returns `None` when the image was
    /// refused.
    pub async fn image_turn(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        state: &mut ConversationState,
        image: &ImageAttachment,
    ) -> Option<String> {
        if image.animated {
            notify(channel, chat_id, ANIMATED_STICKER_REFUSAL).await;
            return None;
        }
        let size = image.declared_size.unwrap_or(0).max(image.bytes.len() as u64);
        if size > self.image_size_limit {
            info!(size, limit = self.image_size_limit, "Refusing oversized image");
            notify(channel, chat_id, IMAGE_TOO_LARGE).await;
            return None;
        }
        if image.bytes.is_empty() {
            warn!("Image arrived without content");
            notify(channel, chat_id, IMAGE_FAILED).await;
            return None;
        }

        let (prompt, marker) = match image.kind {
            ImageKind::Photo => (PHOTO_PROMPT, SENT_PHOTO),
            ImageKind::Sticker => (STICKER_PROMPT, SENT_STICKER),
        };
        let messages = self.context(state, Message::user(prompt));
        let encoded = STANDARD.encode(&image.bytes);

        let raw = self
            .model
            .complete(&self.vision_model, messages, Some(encoded))
            .await;
        let reply = non_empty(strip_think(&raw).trim().to_string());

        state.push_round(marker, reply.clone());
        safe_send(channel, chat_id, &reply).await;
        Some(reply)
    }
}

/// A short plain-text notice.
async fn notify(channel: &dyn Channel, chat_id: &str, text: &str) {
    if let Err(e) = channel.send(chat_id, text).await {
        warn!(channel = channel.name(), error = %e, "Notice could not be delivered");
    }
}
