//! Write path: validate, extract keywords, persist, then embed in the background.
//!
//! The record is durable and keyword-searchable as soon as [`IngestPipeline::ingest`] returns.
//! The embedding is requested on a spawned task and attached when the provider answers.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::memory::core::content_type::ContentType;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::record::MemoryRecord;
use crate::memory::embedding::embedder::{Embedder, EmbeddingUnavailable};
use crate::memory::governor::cache::SearchCache;
use crate::memory::governor::rate_limit::RateLimiter;
use crate::memory::ingest::keywords::KeywordExtractor;
use crate::memory::storage::memory_store::{EmbeddingUpdate, MemoryStore};

/// What happened to a record's embedding request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmbeddingStatus {
    /// The vector was stored.
    Attached {
        /// Whether the vector index changed.
        update: EmbeddingUpdate,
    },
    /// The embedding bucket was empty; the backfill worker will retry.
    Deferred,
    /// The provider failed; the backfill worker will retry.
    Unavailable {
        /// Provider failure.
        reason: String,
    },
    /// The vector could not be stored.
    Failed {
        /// Storage failure.
        reason: String,
    },
}

/// A stored record and its pending embedding task.
#[derive(Debug)]
pub struct Ingested {
    /// Id of the stored record.
    pub id: MemoryId,
    /// Background embedding request.
    pub embedding: JoinHandle<EmbeddingStatus>,
}

/// Parse a caller-supplied content type strictly.
///
/// # Errors
/// Returns a validation error for anything outside the closed set.
pub fn parse_content_type(value: &str) -> MemoryResult<ContentType> {
    ContentType::from_str(value).map_err(|err| MemoryError::Validation(err.to_string()))
}

/// Ingest pipeline shared by explicit stores and hook events.
pub struct IngestPipeline {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    embedding_limiter: Arc<RateLimiter>,
    cache: Arc<SearchCache>,
    keywords: KeywordExtractor,
}

impl IngestPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        embedding_limiter: Arc<RateLimiter>,
        cache: Arc<SearchCache>,
        keywords: KeywordExtractor,
    ) -> Self {
        Self {
            store,
            embedder,
            embedding_limiter,
            cache,
            keywords,
        }
    }

    /// Persist `content` and schedule its embedding.
    ///
    /// # Errors
    /// Returns a validation error for empty content and a storage error if the write fails.
    pub async fn ingest(
        &self,
        content: &str,
        content_type: ContentType,
        supplied_keywords: &[String],
    ) -> MemoryResult<Ingested> {
        let keywords = self.keywords.merge(content, supplied_keywords);
        let record = MemoryRecord::new(content, content_type, keywords)?;
        let text = record.content.clone();
        let id = self.store.insert(record).await?;
        self.cache.invalidate();
        info!(%id, %content_type, "memory stored");

        let store = Arc::clone(&self.store);
        let embedder = Arc::clone(&self.embedder);
        let limiter = Arc::clone(&self.embedding_limiter);
        let cache = Arc::clone(&self.cache);
        let embedding = tokio::spawn(async move {
            embed_and_attach(store.as_ref(), embedder.as_ref(), &limiter, &cache, id, &text)
                .await
        });

        Ok(Ingested { id, embedding })
    }
}

/// Embed `text` if the bucket allows it and attach the vector to `id`.
///
/// A changed vector invalidates `cache`.
pub async fn embed_and_attach(
    store: &dyn MemoryStore,
    embedder: &dyn Embedder,
    limiter: &RateLimiter,
    cache: &SearchCache,
    id: MemoryId,
    text: &str,
) -> EmbeddingStatus {
    if !limiter.try_acquire() {
        debug!(%id, "embedding deferred, bucket empty");
        return EmbeddingStatus::Deferred;
    }

    let vector = match embedder.embed(text).await {
        Ok(vector) => vector,
        Err(err) => {
            log_unavailable(id, &err);
            return EmbeddingStatus::Unavailable {
                reason: err.to_string(),
            };
        }
    };

    match store.update_embedding(id, vector).await {
        Ok(update) => {
            if update == EmbeddingUpdate::Updated {
                cache.invalidate();
            }
            EmbeddingStatus::Attached { update }
        }
        Err(err) => {
            warn!(%id, error = %err, "embedding could not be stored");
            EmbeddingStatus::Failed {
                reason: err.to_string(),
            }
        }
    }
}

fn log_unavailable(id: MemoryId, err: &EmbeddingUnavailable) {
    warn!(%id, error = %err, "embedding unavailable, record stays keyword-only");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::config::{IngestConfig, StorageConfig};
    use crate::memory::embedding::testing::{FailingEmbedder, HashEmbedder};
    use crate::memory::storage::memory_store::SqliteMemoryStore;

    const DIMS: usize = 8;

    async fn pipeline(
        embedder: Arc<dyn Embedder>,
        limiter: RateLimiter,
    ) -> (IngestPipeline, Arc<dyn MemoryStore>) {
        let (pipeline, store, _cache) = pipeline_with_cache(embedder, limiter).await;
        (pipeline, store)
    }

    async fn pipeline_with_cache(
        embedder: Arc<dyn Embedder>,
        limiter: RateLimiter,
    ) -> (IngestPipeline, Arc<dyn MemoryStore>, Arc<SearchCache>) {
        let store: Arc<dyn MemoryStore> = Arc::new(
            SqliteMemoryStore::open(&StorageConfig::in_memory(), DIMS)
                .await
                .unwrap(),
        );
        let cache = Arc::new(SearchCache::new(4).unwrap());
        let keywords = KeywordExtractor::new(&IngestConfig::default()).unwrap();
        let pipeline = IngestPipeline::new(
            Arc::clone(&store),
            embedder,
            Arc::new(limiter),
            Arc::clone(&cache),
            keywords,
        );
        (pipeline, store, cache)
    }

    #[test]
    fn content_type_is_parsed_strictly() {
        assert_eq!(parse_content_type("Decision").ok(), Some(ContentType::Decision));
        assert!(matches!(
            parse_content_type("note"),
            Err(MemoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn stores_then_attaches_embedding() {
        let (pipeline, store) =
            pipeline(Arc::new(HashEmbedder::new(DIMS)), RateLimiter::new("embedding", 5.0)).await;
        let ingested = pipeline
            .ingest("retry sqlite writes once on busy", ContentType::Decision, &[])
            .await
            .unwrap();

        let status = ingested.embedding.await.unwrap();
        assert_eq!(
            status,
            EmbeddingStatus::Attached {
                update: EmbeddingUpdate::Updated
            }
        );
        let records = store.get_many(vec![ingested.id]).await.unwrap();
        assert!(records[0].has_embedding());
        assert!(records[0].keywords.contains("sqlite"));
    }

    #[tokio::test]
    async fn provider_failure_keeps_record_searchable() {
        let embedder = Arc::new(FailingEmbedder::new(DIMS));
        let (pipeline, store) =
            pipeline(embedder.clone(), RateLimiter::new("embedding", 5.0)).await;
        let ingested = pipeline
            .ingest("lifetime error in closure", ContentType::Error, &[])
            .await
            .unwrap();

        assert!(matches!(
            ingested.embedding.await.unwrap(),
            EmbeddingStatus::Unavailable { .. }
        ));
        assert_eq!(embedder.calls(), 1);
        let hits = store.search_keyword("closure", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.without_embedding(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_bucket_defers_embedding() {
        let limiter = RateLimiter::new("embedding", 1.0);
        assert!(limiter.try_acquire());
        let (pipeline, _store) = pipeline(Arc::new(HashEmbedder::new(DIMS)), limiter).await;
        let ingested = pipeline
            .ingest("deferred vector", ContentType::Context, &[])
            .await
            .unwrap();
        assert_eq!(ingested.embedding.await.unwrap(), EmbeddingStatus::Deferred);
    }

    #[tokio::test]
    async fn blank_content_is_rejected_before_storage() {
        let (pipeline, store) =
            pipeline(Arc::new(HashEmbedder::new(DIMS)), RateLimiter::new("embedding", 5.0)).await;
        let err = pipeline.ingest(" \n ", ContentType::Output, &[]).await.err();
        assert!(matches!(err, Some(MemoryError::Validation(_))));
        assert_eq!(store.stats().await.unwrap().records, 0);
    }

    #[tokio::test]
    async fn store_and_attach_each_invalidate_the_cache() {
        let embedder = Arc::new(HashEmbedder::new(DIMS));
        let (pipeline, _store, cache) =
            pipeline_with_cache(embedder, RateLimiter::new("embedding", 5.0)).await;
        let before = cache.generation();
        let ingested = pipeline
            .ingest("cache must see new records", ContentType::Decision, &[])
            .await
            .unwrap();
        ingested.embedding.await.unwrap();
        assert_eq!(cache.generation(), before + 2);
    }
}
