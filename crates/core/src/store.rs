//! StateStore trait — where per-user conversation state lives between turns.
//!
//! The orchestrator never talks to a store directly; the session manager
//! loads a user's state before a turn and saves it afterwards.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::state::ConversationState;

/// The core StateStore trait.
///
/// Implementations: in-memory (default, for testing), JSON-lines file.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Load a user's state. `None` when the user has never been seen.
    async fn load(&self, user_id: &str) -> std::result::Result<Option<ConversationState>, StoreError>;

    /// Persist a user's state, replacing any previous record.
    async fn save(&self, user_id: &str, state: &ConversationState) -> std::result::Result<(), StoreError>;

    /// Forget a user entirely.
    async fn clear(&self, user_id: &str) -> std::result::Result<(), StoreError>;

    /// Number of users with a stored record.
    async fn count(&self) -> std::result::Result<usize, StoreError>;
}
