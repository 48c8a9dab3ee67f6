//! Error types for the lalabot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; callers propagate the one
//! for the seam they sit on.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    /// The edit carried exactly the text already shown. Harmless.
    #[error("Message is not modified")]
    NotModified,

    /// The platform refused the edit (permissions, validation, deleted message).
    #[error("Edit rejected by {channel}: {reason}")]
    EditRejected { channel: String, reason: String },

    /// The platform could not parse the rich-text markup of a message.
    #[error("Markup rejected by {channel}: {reason}")]
    MarkupRejected { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl ChannelError {
    /// Whether the error means the edit had nothing to change.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, ChannelError::NotModified)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted record for {user_id}: {reason}")]
    Corrupted { user_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing injected context for {tool_name}: {what}")]
    MissingContext { tool_name: String, what: String },

    #[error("Invalid tool registration: {tool_name} — {reason}")]
    InvalidRegistration { tool_name: String, reason: String },
}
