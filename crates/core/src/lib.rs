//! # lalabot Core
//!
//! Domain types, traits, and error definitions for the lalabot chat assistant.
//! This crate defines the domain model that all other crates implement
//! against: messages, per-user conversation state, tool calls, and the
//! front-end, model-backend, state-store and tool seams.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here. Implementations
//! live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod state;
pub mod provider;
pub mod channel;
pub mod tool;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{ChannelError, ProviderError, StoreError, ToolError};
pub use message::{Message, Role};
pub use state::ConversationState;
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use channel::{Channel, ChannelMessage, ChannelId, MessageHandle};
pub use tool::{Injection, Tool, ToolCall, ToolInput, ToolRegistry, ToolResult};
pub use store::StateStore;
