//! In-memory store — the default, and what the tests use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lalabot_core::error::StoreError;
use lalabot_core::state::ConversationState;
use lalabot_core::store::StateStore;
use tokio::sync::RwLock;

/// Keeps every user's state in a map. Lost on restart.
pub struct InMemoryStore {
    states: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, user_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, state: &ConversationState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(user_id.to_string(), state.clone());
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.states.write().await.remove(user_id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.states.read().await.len())
    }
}
