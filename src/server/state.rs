//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::memory::core::config::EngineConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::engine::MemoryEngine;

/// Shared application state.
pub struct AppState {
    /// Memory engine serving every route.
    pub engine: MemoryEngine,
}

impl AppState {
    /// Wrap an existing engine.
    #[must_use]
    pub fn new(engine: MemoryEngine) -> Arc<Self> {
        Arc::new(Self { engine })
    }

    /// Open the `SQLite` engine described by `config`.
    ///
    /// # Errors
    /// Returns an error if the store or the embedding client cannot be created.
    pub async fn from_config(config: EngineConfig) -> MemoryResult<Arc<Self>> {
        Ok(Self::new(MemoryEngine::from_config(config).await?))
    }
}
