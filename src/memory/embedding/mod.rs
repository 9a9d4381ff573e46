//! Embedding provider modules.

pub mod embedder;
#[cfg(test)]
pub(crate) mod testing;

pub use embedder::{
    EmbedFuture, Embedder, EmbeddingUnavailable, OllamaEmbedder, parse_embedding_response,
};
