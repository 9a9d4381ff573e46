//! Memory subsystem for coding agents.
//!
//! Organized into:
//! - `core`: configuration, errors, ids, content types and records
//! - `embedding`: embedding provider abstraction and Ollama client
//! - `storage`: `SQLite` store with FTS5 and sqlite-vec indexes
//! - `retrieval`: reciprocal rank fusion and hybrid search
//! - `governor`: debouncing, rate limiting and the search cache
//! - `context`: token-budgeted context assembly
//! - `ingest`: keyword extraction and the write pipeline
//! - `maintenance`: embedding backfill worker
//! - `engine`: orchestration, request and hook dispatch

pub mod context;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod governor;
pub mod ingest;
pub mod maintenance;
pub mod retrieval;
pub mod storage;

// Re-export commonly used types for convenience
pub use context::{AssembledContext, ContextBudget, assemble, estimate_tokens};
pub use core::{
    ContentType, EmbeddingConfig, EngineConfig, MemoryError, MemoryId, MemoryRecord,
    MemoryResult, StorageConfig,
};
pub use embedding::{EmbedFuture, Embedder, EmbeddingUnavailable, OllamaEmbedder};
pub use engine::{
    ContextRequest, EngineStats, HookEvent, HookOutcome, MemoryBackends, MemoryEngine,
    MemoryRequest, MemoryResponse, SearchRequest,
};
pub use governor::{ExecutionGovernor, GovernorStats, Outcome, SkipReason};
pub use maintenance::{BackfillStats, EmbeddingBackfill};
pub use retrieval::{HybridSearcher, SearchHit};
pub use storage::{
    EmbeddingUpdate, MemoryStore, SqliteMemoryStore, StoreStats, init_sqlite_vec_extension,
};
