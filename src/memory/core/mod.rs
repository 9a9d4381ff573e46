//! Core memory types and identifiers.

pub mod config;
pub mod content_type;
pub mod errors;
pub mod ids;
pub mod record;

pub use config::{
    BackfillConfig, ContextConfig, EmbeddingConfig, EngineConfig, FusionConfig, GovernorConfig,
    IngestConfig, SearchConfig, ServerConfig, StorageConfig,
};
pub use content_type::{ContentType, ContentTypeParseError};
pub use errors::{MemoryError, MemoryResult};
pub use ids::MemoryId;
pub use record::{MemoryRecord, validate_vector};
