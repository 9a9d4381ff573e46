//! Background maintenance for the memory store.

pub mod embedding_backfill;

pub use embedding_backfill::{BackfillStats, EmbeddingBackfill};
