//! Configuration for the memory engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Environment variable overriding the `SQLite` database path.
pub const ENV_DB_PATH: &str = "SEMANTIC_MEMORY_DB";
/// Environment variable overriding the embedding service base URL.
pub const ENV_EMBEDDING_URL: &str = "SEMANTIC_MEMORY_EMBEDDING_URL";
/// Environment variable overriding the embedding model name.
pub const ENV_EMBEDDING_MODEL: &str = "SEMANTIC_MEMORY_EMBEDDING_MODEL";
/// Environment variable overriding the embedding dimension.
pub const ENV_EMBEDDING_DIMS: &str = "SEMANTIC_MEMORY_EMBEDDING_DIMS";
/// Environment variable overriding the HTTP port.
pub const ENV_PORT: &str = "SEMANTIC_MEMORY_PORT";

/// Top-level configuration for the memory engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,
    /// Rank fusion settings.
    pub fusion: FusionConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Debounce, rate limit and cache settings.
    pub governor: GovernorConfig,
    /// Context assembly budgets.
    pub context: ContextConfig,
    /// Keyword extraction settings.
    pub ingest: IngestConfig,
    /// Embedding backfill worker settings.
    pub backfill: BackfillConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl EngineConfig {
    /// Load configuration from an optional JSON file, then apply environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an override is malformed, or
    /// the result fails validation.
    pub fn load(path: Option<&Path>) -> MemoryResult<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SEMANTIC_MEMORY_*` environment overrides.
    ///
    /// # Errors
    /// Returns an error if a numeric override does not parse.
    pub fn apply_env_overrides(&mut self) -> MemoryResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> MemoryResult<()> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(url) = lookup(ENV_EMBEDDING_URL) {
            self.embedding.base_url = url;
        }
        if let Some(model) = lookup(ENV_EMBEDDING_MODEL) {
            self.embedding.model = model;
        }
        if let Some(dims) = lookup(ENV_EMBEDDING_DIMS) {
            self.embedding.ndims = dims.parse().map_err(|_| {
                MemoryError::InvalidConfig(format!("{ENV_EMBEDDING_DIMS} must be an integer"))
            })?;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port.parse().map_err(|_| {
                MemoryError::InvalidConfig(format!("{ENV_PORT} must be a port number"))
            })?;
        }
        Ok(())
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.embedding.ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.embedding.timeout_ms == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.timeout_ms must be > 0".to_string(),
            ));
        }

        Url::parse(&self.embedding.base_url)?;

        self.fusion.validate()?;

        if self.search.default_limit == 0 {
            return Err(MemoryError::InvalidConfig(
                "search.default_limit must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.search.min_relevance) {
            return Err(MemoryError::InvalidConfig(
                "search.min_relevance must be within [0, 1]".to_string(),
            ));
        }

        if self.governor.cache_capacity == 0 {
            return Err(MemoryError::InvalidConfig(
                "governor.cache_capacity must be > 0".to_string(),
            ));
        }

        if !(self.governor.memory_ops_per_second > 0.0
            && self.governor.embedding_ops_per_second > 0.0)
        {
            return Err(MemoryError::InvalidConfig(
                "governor rates must be > 0".to_string(),
            ));
        }

        if self.ingest.max_keywords == 0 {
            return Err(MemoryError::InvalidConfig(
                "ingest.max_keywords must be > 0".to_string(),
            ));
        }

        if self.backfill.batch_size == 0 {
            return Err(MemoryError::InvalidConfig(
                "backfill.batch_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database path; `:memory:` opens a private in-memory database.
    pub sqlite_path: PathBuf,
    /// Busy timeout applied to each connection, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl StorageConfig {
    /// In-memory storage, mainly for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }

    /// True when the configured path designates an in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path.as_os_str() == ":memory:"
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("semantic_memory.sqlite"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Embedding provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service.
    pub base_url: String,
    /// Embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Hard timeout for one embedding request, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            timeout_ms: 30_000,
        }
    }
}

/// Reciprocal Rank Fusion coefficients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// RRF smoothing constant.
    pub k_rrf: f64,
    /// Weight of the vector ranking.
    pub vector_weight: f64,
    /// Weight of the keyword ranking.
    pub keyword_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k_rrf: 60.0,
            vector_weight: 0.6,
            keyword_weight: 0.4,
        }
    }
}

impl FusionConfig {
    /// Validate fusion coefficients.
    ///
    /// # Errors
    /// Returns an error if `k_rrf` is not positive or a weight is negative or both are zero.
    pub fn validate(&self) -> MemoryResult<()> {
        if !(self.k_rrf.is_finite() && self.k_rrf > 0.0) {
            return Err(MemoryError::InvalidConfig(
                "fusion.k_rrf must be > 0".to_string(),
            ));
        }

        if !(self.vector_weight >= 0.0 && self.keyword_weight >= 0.0) {
            return Err(MemoryError::InvalidConfig(
                "fusion weights must be >= 0".to_string(),
            ));
        }

        if self.vector_weight + self.keyword_weight <= 0.0 {
            return Err(MemoryError::InvalidConfig(
                "at least one fusion weight must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Search defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result count when the caller does not specify one.
    pub default_limit: usize,
    /// Relevance floor when the caller does not specify one.
    pub min_relevance: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            min_relevance: 0.03,
        }
    }
}

/// Debounce, rate limit and cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Trailing debounce window per key, in milliseconds.
    pub debounce_ms: u64,
    /// Token bucket rate (and burst) for memory operations.
    pub memory_ops_per_second: f64,
    /// Token bucket rate (and burst) for embedding requests.
    pub embedding_ops_per_second: f64,
    /// LRU capacity of the search cache.
    pub cache_capacity: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            memory_ops_per_second: 10.0,
            embedding_ops_per_second: 5.0,
            cache_capacity: 20,
        }
    }
}

/// Default token budgets for context assembly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Budget for external documentation.
    pub doc_tokens: usize,
    /// Budget for memory results.
    pub memory_tokens: usize,
    /// Number of memory results requested for assembly.
    pub memory_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            doc_tokens: 2_000,
            memory_tokens: 1_500,
            memory_limit: 10,
        }
    }
}

/// Keyword extraction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum number of extracted keywords per record.
    pub max_keywords: usize,
    /// Minimum keyword length in characters.
    pub min_keyword_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_keywords: 12,
            min_keyword_chars: 3,
        }
    }
}

/// Embedding backfill worker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Whether the worker runs.
    pub enabled: bool,
    /// Interval between sweeps, in seconds.
    pub interval_seconds: u64,
    /// Maximum records embedded per sweep.
    pub batch_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            batch_size: 25,
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 7420 }
    }
}
