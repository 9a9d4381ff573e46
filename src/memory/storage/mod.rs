//! Persistent storage for memory records.

pub mod memory_store;
pub mod sqlite_vec_loader;

pub use memory_store::{
    EmbeddingUpdate, IndexHit, MAX_INDEX_K, MemoryStore, SqliteMemoryStore, StoreFuture,
    StoreStats, fts_query,
};
pub use sqlite_vec_loader::init_sqlite_vec_extension;
