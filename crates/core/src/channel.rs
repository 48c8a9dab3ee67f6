//! Channel trait — the abstraction over chat front ends.
//!
//! A Channel connects lalabot to a messaging platform (Telegram, CLI, ...).
//! It delivers incoming text/image events and exposes a handle for sending
//! and editing outgoing messages, which is all the orchestrator needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// The channel this message belongs to
    pub channel_id: ChannelId,

    /// Sender identifier (platform-specific user ID)
    pub sender_id: String,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// The chat/group/DM identifier within the channel
    pub chat_id: String,

    /// The text content (empty for image-only events)
    pub content: String,

    /// An attached image, already downloaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
}

impl ChannelMessage {
    /// Convenience constructor for a plain text event.
    pub fn text(
        channel_id: ChannelId,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel_id,
            sender_id: sender_id.into(),
            sender_name: None,
            chat_id: chat_id.into(),
            content: content.into(),
            image: None,
        }
    }
}

/// Raw image bytes delivered with a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub kind: ImageKind,

    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// Size announced by the platform before download, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,

    /// Animated or video stickers cannot be described
    #[serde(default)]
    pub animated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Photo,
    Sticker,
}

/// Handle to a message the bot has sent, used to edit it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: String,
    pub message_id: String,
}

/// The core Channel trait.
///
/// Implementations handle platform-specific connection logic, message
/// formatting, and authentication.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "telegram", "cli").
    fn name(&self) -> &str;

    /// Unique ID for this channel instance.
    fn id(&self) -> &ChannelId;

    /// Start listening for incoming messages.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChannelMessage, ChannelError>>,
        ChannelError,
    >;

    /// Send a plain-text message and return a handle for later edits.
    async fn send(
        &self,
        chat_id: &str,
        content: &str,
    ) -> std::result::Result<MessageHandle, ChannelError>;

    /// Send a message using the platform's rich-text markup.
    ///
    /// Platforms without markup send plain text.
    async fn send_rich(
        &self,
        chat_id: &str,
        content: &str,
    ) -> std::result::Result<MessageHandle, ChannelError> {
        self.send(chat_id, content).await
    }

    /// Replace the full text of a previously sent message.
    ///
    /// Returns `ChannelError::NotModified` when the text is unchanged and
    /// `ChannelError::EditRejected` when the platform refuses the edit.
    async fn edit(
        &self,
        handle: &MessageHandle,
        content: &str,
    ) -> std::result::Result<(), ChannelError>;

    /// Send a typing indicator (if the platform supports it).
    async fn send_typing(&self, _chat_id: &str) -> std::result::Result<(), ChannelError> {
        Ok(()) // No-op default
    }

    /// Check if a sender is allowed (allowlist check).
    fn is_allowed(&self, sender_id: &str) -> bool;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check — is the channel connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
