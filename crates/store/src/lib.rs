//! Conversation state stores for lalabot.

pub mod file;
pub mod in_memory;

pub use file::FileStore;
pub use in_memory::InMemoryStore;

use std::sync::Arc;

use lalabot_config::AppConfig;
use lalabot_core::store::StateStore;

/// Build the store selected by `store.backend`.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn StateStore> {
    match config.store.backend.as_str() {
        "file" => Arc::new(FileStore::new(config.store_path())),
        _ => Arc::new(InMemoryStore::new()),
    }
}
