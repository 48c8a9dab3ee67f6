//! File-based store — persistent JSON-lines storage.
//!
//! Each line is one `{"user_id": ..., "state": {...}}` record. Records are
//! loaded into memory on creation and the whole file is rewritten on every
//! mutation, which keeps reads fast and the file human-inspectable.
//!
//! Storage location: `~/.lalabot/state.jsonl` unless configured.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lalabot_core::error::StoreError;
use lalabot_core::state::ConversationState;
use lalabot_core::store::StateStore;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    user_id: String,
    state: ConversationState,
}

/// A file-backed state store using JSONL (one record per user).
pub struct FileStore {
    path: PathBuf,
    states: Arc<RwLock<HashMap<String, ConversationState>>>,
    /// Held from snapshot to rename so writes land in mutation order.
    flush_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// Existing records are loaded; a missing file starts empty and is
    /// created on first write.
    pub fn new(path: PathBuf) -> Self {
        let states = Self::load_from_disk(&path);
        debug!(path = %path.display(), users = states.len(), "File state store loaded");
        Self {
            path,
            states: Arc::new(RwLock::new(states)),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> HashMap<String, ConversationState> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return HashMap::new(), // File doesn't exist yet — start empty
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Record>(line) {
                Ok(record) => Some((record.user_id, record.state)),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted state record");
                    None
                }
            })
            .collect()
    }

    /// Flush all records to disk as JSONL, sorted by user for stable diffs.
    ///
    /// The file is replaced atomically through a sibling temp file.
    async fn flush(&self) -> Result<(), StoreError> {
        let _flushing = self.flush_lock.lock().await;
        let content = {
            let states = self.states.read().await;
            let mut user_ids: Vec<&String> = states.keys().collect();
            user_ids.sort();

            let mut content = String::new();
            for user_id in user_ids {
                let record = Record {
                    user_id: user_id.clone(),
                    state: states[user_id].clone(),
                };
                let line = serde_json::to_string(&record).map_err(|e| StoreError::Corrupted {
                    user_id: user_id.clone(),
                    reason: e.to_string(),
                })?;
                content.push_str(&line);
                content.push('\n');
            }
            content
        };

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create state directory: {e}"))
            })?;
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write state file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace state file: {e}")))
    }
}

#[async_trait]
impl StateStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, user_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, state: &ConversationState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(user_id.to_string(), state.clone());
        self.flush().await
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        let removed = self.states.write().await.remove(user_id).is_some();
        if removed {
            self.flush().await?;
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.states.read().await.len())
    }
}
