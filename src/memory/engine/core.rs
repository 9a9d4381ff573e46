//! Memory engine orchestration.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::memory::context::budget::ContextBudget;
use crate::memory::context::builder::{AssembledContext, assemble};
use crate::memory::core::config::EngineConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::embedding::embedder::{Embedder, OllamaEmbedder};
use crate::memory::engine::requests::{
    ContextRequest, HookEvent, HookOutcome, MemoryRequest, MemoryResponse, SearchRequest,
};
use crate::memory::governor::cache::SearchKey;
use crate::memory::governor::execution::{ExecutionGovernor, GovernorStats};
use crate::memory::governor::outcome::Outcome;
use crate::memory::ingest::keywords::KeywordExtractor;
use crate::memory::ingest::pipeline::{IngestPipeline, parse_content_type};
use crate::memory::maintenance::embedding_backfill::EmbeddingBackfill;
use crate::memory::retrieval::hybrid_search::{HybridSearcher, SearchHit};
use crate::memory::storage::memory_store::{
    EmbeddingUpdate, MemoryStore, SqliteMemoryStore, StoreStats,
};

/// Backend dependencies for the memory engine.
pub struct MemoryBackends {
    /// Record store with both indexes.
    pub store: Arc<dyn MemoryStore>,
    /// Embedding provider.
    pub embedder: Arc<dyn Embedder>,
}

impl MemoryBackends {
    /// Build default `SQLite` and Ollama backends from config.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn sqlite(config: &EngineConfig) -> MemoryResult<Self> {
        let store =
            Arc::new(SqliteMemoryStore::open(&config.storage, config.embedding.ndims).await?);
        let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);

        Ok(Self { store, embedder })
    }
}

/// Snapshot of store and governor state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Row counts.
    pub store: StoreStats,
    /// Governor counters.
    pub governor: GovernorStats,
}

/// Memory engine: governed search, ingestion and context assembly over one store.
pub struct MemoryEngine {
    config: EngineConfig,
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    governor: ExecutionGovernor,
    searcher: HybridSearcher,
    pipeline: IngestPipeline,
}

impl MemoryEngine {
    /// Create a new memory engine.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the embedder dimension differs from
    /// the configured one.
    pub fn new(config: EngineConfig, backends: MemoryBackends) -> MemoryResult<Self> {
        config.validate()?;
        if backends.embedder.ndims() != config.embedding.ndims {
            return Err(MemoryError::InvalidConfig(format!(
                "embedder produces {} dimensions, embedding.ndims is {}",
                backends.embedder.ndims(),
                config.embedding.ndims
            )));
        }

        let governor = ExecutionGovernor::new(&config.governor)?;
        let searcher = HybridSearcher::new(
            Arc::clone(&backends.store),
            Arc::clone(&backends.embedder),
            governor.embedding_limiter(),
            config.fusion.clone(),
        );
        let pipeline = IngestPipeline::new(
            Arc::clone(&backends.store),
            Arc::clone(&backends.embedder),
            governor.embedding_limiter(),
            governor.search_cache(),
            KeywordExtractor::new(&config.ingest)?,
        );

        Ok(Self {
            config,
            store: backends.store,
            embedder: backends.embedder,
            governor,
            searcher,
            pipeline,
        })
    }

    /// Create a new engine using `SQLite` backends.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(config: EngineConfig) -> MemoryResult<Self> {
        let backends = MemoryBackends::sqlite(&config).await?;
        let engine = Self::new(config, backends)?;
        info!(
            ndims = engine.config.embedding.ndims,
            model = %engine.config.embedding.model,
            "memory engine ready"
        );
        Ok(engine)
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Persist a record. Waits for a memory token instead of dropping the write; the embedding
    /// is attached in the background.
    ///
    /// # Errors
    /// Returns a validation error for empty content or an unknown content type, and a storage
    /// error if the write fails.
    pub async fn store(
        &self,
        content: &str,
        content_type: &str,
        keywords: &[String],
    ) -> MemoryResult<MemoryId> {
        let content_type = parse_content_type(content_type)?;
        if content.trim().is_empty() {
            return Err(MemoryError::validation("content must not be empty"));
        }
        self.governor.admit().await;
        let ingested = self.pipeline.ingest(content, content_type, keywords).await?;
        Ok(ingested.id)
    }

    /// Governed hybrid search. Never fails: overload and failures are reported as skips.
    pub async fn search(&self, request: SearchRequest) -> Outcome<Vec<SearchHit>> {
        if request.query.trim().is_empty() {
            return Outcome::Executed(Vec::new());
        }

        let limit = request.limit.unwrap_or(self.config.search.default_limit);
        let min_relevance = request
            .min_relevance
            .unwrap_or(self.config.search.min_relevance);
        let key = SearchKey::new(&request.query, request.content_type, limit, min_relevance);

        self.governor
            .search(key, || {
                self.searcher
                    .search(&request.query, request.content_type, limit, min_relevance)
            })
            .await
    }

    /// Attach a vector to an existing record. A changed vector drops cached searches.
    ///
    /// # Errors
    /// Returns [`MemoryError::NotFound`] for an unknown id and a validation error for a vector
    /// of the wrong dimension.
    pub async fn update_embedding(
        &self,
        id: MemoryId,
        embedding: Vec<f32>,
    ) -> MemoryResult<EmbeddingUpdate> {
        self.governor.admit().await;
        let update = self.store.update_embedding(id, embedding).await?;
        if update == EmbeddingUpdate::Updated {
            self.governor.invalidate();
        }
        Ok(update)
    }

    /// Assemble documentation, relevant memories and the current file. Never fails; when the
    /// search is skipped the context carries no memories.
    pub async fn assemble_context(&self, request: ContextRequest) -> AssembledContext {
        match self.governed_context(&request).await {
            Outcome::Executed(context) | Outcome::Cached(context) => context,
            Outcome::Skipped(reason) => {
                debug!(?reason, "memory search skipped, assembling without memories");
                self.render(&request, &[])
            }
        }
    }

    /// Remove a record from the store and every index, then drop cached searches.
    ///
    /// # Errors
    /// Returns a storage error if the delete fails.
    pub async fn delete(&self, id: MemoryId) -> MemoryResult<bool> {
        self.governor.admit().await;
        let deleted = self.store.delete(id).await?;
        if deleted {
            self.governor.invalidate();
            info!(%id, "memory deleted");
        }
        Ok(deleted)
    }

    /// Handle a hook event. Hooks are debounced per key and never fail.
    pub async fn handle_hook(&self, event: HookEvent) -> HookOutcome {
        let key = event.debounce_key();
        match event {
            HookEvent::Before {
                query,
                doc_blob,
                current_file,
                content_type,
                ..
            } => {
                let request = ContextRequest {
                    doc_blob,
                    query,
                    budget: None,
                    current_file,
                    content_type,
                };
                self.governor
                    .debounce(&key, || self.governed_context(&request))
                    .await
                    .into()
            }
            HookEvent::After {
                content,
                content_type,
                keywords,
                ..
            } => self
                .governor
                .debounced(&key, || async {
                    let content_type = parse_content_type(&content_type)?;
                    let ingested = self.pipeline.ingest(&content, content_type, &keywords).await?;
                    Ok::<_, MemoryError>(ingested.id)
                })
                .await
                .into(),
        }
    }

    /// Run one request.
    ///
    /// # Errors
    /// Returns the error of the underlying write operation; searches and context assembly
    /// never fail.
    pub async fn dispatch(&self, request: MemoryRequest) -> MemoryResult<MemoryResponse> {
        let response = match request {
            MemoryRequest::Store {
                content,
                content_type,
                keywords,
            } => MemoryResponse::Stored {
                id: self.store(&content, &content_type, &keywords).await?,
            },
            MemoryRequest::Search(search) => MemoryResponse::Search {
                outcome: self.search(search).await,
            },
            MemoryRequest::UpdateEmbedding { id, embedding } => MemoryResponse::EmbeddingUpdated {
                update: self.update_embedding(id, embedding).await?,
            },
            MemoryRequest::AssembleContext(context) => MemoryResponse::Context {
                context: self.assemble_context(context).await,
            },
            MemoryRequest::Delete { id } => MemoryResponse::Deleted {
                deleted: self.delete(id).await?,
            },
        };
        Ok(response)
    }

    /// Current store and governor statistics.
    ///
    /// # Errors
    /// Returns a storage error if row counts cannot be read.
    pub async fn stats(&self) -> MemoryResult<EngineStats> {
        Ok(EngineStats {
            store: self.store.stats().await?,
            governor: self.governor.stats().await,
        })
    }

    /// Backfill worker sharing this engine's store, embedder and embedding bucket.
    #[must_use]
    pub fn backfill(&self) -> EmbeddingBackfill {
        EmbeddingBackfill::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            self.governor.embedding_limiter(),
            self.governor.search_cache(),
            self.config.backfill.clone(),
        )
    }

    async fn governed_context(&self, request: &ContextRequest) -> Outcome<AssembledContext> {
        let search = SearchRequest {
            query: request.query.clone(),
            content_type: request.content_type,
            limit: Some(self.config.context.memory_limit),
            min_relevance: None,
        };
        self.search(search)
            .await
            .map(|hits| self.render(request, &hits))
    }

    fn render(&self, request: &ContextRequest, hits: &[SearchHit]) -> AssembledContext {
        let budget = request
            .budget
            .unwrap_or_else(|| ContextBudget::from(&self.config.context));
        assemble(
            &request.doc_blob,
            hits,
            budget,
            request.current_file.as_deref(),
        )
    }
}
