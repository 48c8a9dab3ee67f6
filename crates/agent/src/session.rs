//! Session manager: one conversation state per user, loaded lazily from the
//! state store and held exclusively for the length of a turn.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use lalabot_core::error::StoreError;
use lalabot_core::state::ConversationState;
use lalabot_core::store::StateStore;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Session {
    state: Arc<AsyncMutex<ConversationState>>,
    cancel: Mutex<CancellationToken>,
}

impl Session {
    fn new(state: ConversationState) -> Self {
        Self {
            state: Arc::new(AsyncMutex::new(state)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn token(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn cancel(&self) {
        self.token().cancel();
    }

    fn renew(&self) {
        let mut token = match self.cancel.lock() {
            Ok(token) => token,
            Err(poisoned) => poisoned.into_inner(),
        };
        *token = CancellationToken::new();
    }
}

/// Exclusive access to one user's state for the length of a turn.
pub struct SessionGuard {
    user_id: String,
    state: OwnedMutexGuard<ConversationState>,
    cancel: CancellationToken,
}

impl SessionGuard {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Cancelled when the user resets or the bot shuts down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Deref for SessionGuard {
    type Target = ConversationState;

    fn deref(&self) -> &ConversationState {
        &self.state
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut ConversationState {
        &mut self.state
    }
}

pub struct SessionManager {
    store: Arc<dyn StateStore>,
    max_rounds: usize,
    sessions: AsyncMutex<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn StateStore>, max_rounds: usize) -> Self {
        Self {
            store,
            max_rounds,
            sessions: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn session(&self, user_id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.lock().await.get(user_id) {
            return session.clone();
        }

        // The store is read without the map lock so a slow load never
        // stalls other users. A racing load for the same user loses.
        let state = self.load(user_id).await;
        self.sessions
            .lock()
            .await
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Session::new(state)))
            .clone()
    }

    async fn load(&self, user_id: &str) -> ConversationState {
        let mut state = match self.store.load(user_id).await {
            Ok(Some(state)) => {
                debug!(user_id, "Restored conversation state");
                state
            }
            Ok(None) => ConversationState::new(self.max_rounds),
            Err(e) => {
                warn!(user_id, error = %e, "Could not load state, starting fresh");
                ConversationState::new(self.max_rounds)
            }
        };
        state.set_max_rounds(self.max_rounds);
        state
    }

    /// Wait for exclusive access to a user's state.
    pub async fn acquire(&self, user_id: &str) -> SessionGuard {
        let session = self.session(user_id).await;
        let state = session.state.clone().lock_owned().await;
        SessionGuard {
            user_id: user_id.to_string(),
            state,
            cancel: session.token(),
        }
    }

    /// Write the guarded state to the store.
    pub async fn persist(&self, guard: &SessionGuard) -> Result<(), StoreError> {
        self.store.save(&guard.user_id, &guard.state).await
    }

    /// Cancel any in-flight turn, then restore the user's state to its
    /// defaults in memory and in the store.
    pub async fn reset(&self, user_id: &str) -> Result<(), StoreError> {
        let session = self.session(user_id).await;
        session.cancel();
        {
            let mut state = session.state.lock().await;
            state.reset();
            session.renew();
        }
        info!(user_id, "Conversation reset");
        self.store.clear(user_id).await
    }

    /// Cancel every in-flight turn.
    pub async fn cancel_all(&self) {
        let sessions = self.sessions.lock().await;
        for session in sessions.values() {
            session.cancel();
        }
        debug!(sessions = sessions.len(), "Cancelled all sessions");
    }

    /// Drop sessions nobody is using. Their state was persisted at the end
    /// of their last turn and is reloaded from the store on next contact.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            Arc::strong_count(session) > 1 || Arc::strong_count(&session.state) > 1
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Number of sessions currently held in memory.
    pub async fn active(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
