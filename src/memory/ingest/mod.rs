//! Ingestion: keyword extraction and the write pipeline.

pub mod keywords;
pub mod pipeline;

pub use keywords::{KeywordExtractor, normalize_text};
pub use pipeline::{
    EmbeddingStatus, IngestPipeline, Ingested, embed_and_attach, parse_content_type,
};
