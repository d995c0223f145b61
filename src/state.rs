//! Application state shared by every handler: game tuning and persistence.
//!
//! Game sessions are not stored here; each lives inside its WebSocket task.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{load_game_config_from_env, GameConfig};
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GameConfig>,
    pub storage: Arc<Storage>,
}

impl AppState {
    /// Build state from env: load the TOML tuning and open the file store it names.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_game_config_from_env();
        let storage = Storage::open_or_memory(&config.storage.path, config.storage.quota_bytes);
        info!(
            target: "numquest",
            storage = %config.storage.path.display(),
            catch_mode = ?config.catch.mode,
            dev_unlock_all = config.dev_unlock_all,
            "Application state ready"
        );
        Self::with(config, storage)
    }

    pub fn with(config: GameConfig, storage: Storage) -> Self {
        Self { config: Arc::new(config), storage: Arc::new(storage) }
    }

    /// Defaults over an in-memory store.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::with(GameConfig::default(), Storage::new(crate::storage::MemoryStore::default()))
    }
}
