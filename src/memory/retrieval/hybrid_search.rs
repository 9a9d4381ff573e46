//! Hybrid search combining BM25 keyword matching with vector similarity.
//!
//! Both indexes are queried concurrently and combined with Reciprocal Rank Fusion. When the
//! query cannot be embedded or the vector index cannot be read, the search continues on
//! keywords alone.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::memory::core::config::FusionConfig;
use crate::memory::core::content_type::ContentType;
use crate::memory::core::errors::MemoryResult;
use crate::memory::core::ids::MemoryId;
use crate::memory::core::record::MemoryRecord;
use crate::memory::embedding::embedder::Embedder;
use crate::memory::governor::rate_limit::RateLimiter;
use crate::memory::retrieval::fusion::{FusedScore, fuse, select};
use crate::memory::storage::memory_store::{IndexHit, MAX_INDEX_K, MemoryStore};

/// A ranked search result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    /// The matched record.
    pub record: MemoryRecord,
    /// Raw fused score.
    pub score: f64,
    /// Normalised score in `[0, 1]`.
    pub relevance: f64,
}

/// Hybrid searcher over a memory store.
pub struct HybridSearcher {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    embedding_limiter: Arc<RateLimiter>,
    fusion: FusionConfig,
}

impl HybridSearcher {
    /// Create a new hybrid searcher.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        embedding_limiter: Arc<RateLimiter>,
        fusion: FusionConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            embedding_limiter,
            fusion,
        }
    }

    /// Search both indexes and return up to `limit` records, best first.
    ///
    /// A blank query or a zero limit yields an empty list.
    ///
    /// # Errors
    /// Returns an error if the keyword query or the record lookup fails.
    pub async fn search(
        &self,
        query: &str,
        content_type: Option<ContentType>,
        limit: usize,
        min_relevance: f64,
    ) -> MemoryResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let k = limit.saturating_mul(2).min(MAX_INDEX_K);
        let vector_side = async {
            let Some(vector) = self.embed_query(query).await else {
                return Vec::new();
            };
            match self.store.search_vector(vector, k, content_type).await {
                Ok(hits) => hits,
                Err(err) => {
                    warn!(error = %err, "vector index unavailable, keyword-only search");
                    Vec::new()
                }
            }
        };
        let keyword_side = self.store.search_keyword(query, k, content_type);
        let (vector_hits, keyword_hits) = futures::join!(vector_side, keyword_side);
        let keyword_hits = keyword_hits?;

        let fused = fuse(&ids(&vector_hits), &ids(&keyword_hits), &self.fusion);
        let candidates = fused.len();
        let selected = select(fused, min_relevance, limit);
        debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            candidates,
            selected = selected.len(),
            "hybrid search"
        );

        self.join_records(selected).await
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if !self.embedding_limiter.try_acquire() {
            debug!("embedding bucket empty, keyword-only search");
            return None;
        }

        match self.embedder.embed(query).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(error = %err, "query embedding unavailable, keyword-only search");
                None
            }
        }
    }

    async fn join_records(&self, selected: Vec<FusedScore>) -> MemoryResult<Vec<SearchHit>> {
        let scores: HashMap<MemoryId, FusedScore> =
            selected.iter().map(|entry| (entry.id, *entry)).collect();
        let records = self
            .store
            .get_many(selected.iter().map(|entry| entry.id).collect())
            .await?;

        Ok(records
            .into_iter()
            .filter_map(|record| {
                scores.get(&record.id).map(|entry| SearchHit {
                    score: entry.score,
                    relevance: entry.relevance,
                    record,
                })
            })
            .collect())
    }
}

fn ids(hits: &[IndexHit]) -> Vec<MemoryId> {
    hits.iter().map(|hit| hit.id).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::memory::core::config::StorageConfig;
    use crate::memory::core::errors::MemoryError;
    use crate::memory::embedding::testing::{FailingEmbedder, HashEmbedder};
    use crate::memory::storage::memory_store::{
        EmbeddingUpdate, SqliteMemoryStore, StoreFuture, StoreStats,
    };

    const DIMS: usize = 16;

    async fn store() -> Arc<dyn MemoryStore> {
        Arc::new(
            SqliteMemoryStore::open(&StorageConfig::in_memory(), DIMS)
                .await
                .unwrap(),
        )
    }

    /// Store whose vector index always fails to read.
    struct VectorIndexDown(Arc<dyn MemoryStore>);

    impl MemoryStore for VectorIndexDown {
        fn insert(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<MemoryId>> {
            self.0.insert(record)
        }

        fn update_embedding(
            &self,
            id: MemoryId,
            embedding: Vec<f32>,
        ) -> StoreFuture<'_, MemoryResult<EmbeddingUpdate>> {
            self.0.update_embedding(id, embedding)
        }

        fn get_many(
            &self,
            ids: Vec<MemoryId>,
        ) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
            self.0.get_many(ids)
        }

        fn search_vector(
            &self,
            _vector: Vec<f32>,
            _k: usize,
            _content_type: Option<ContentType>,
        ) -> StoreFuture<'_, MemoryResult<Vec<IndexHit>>> {
            Box::pin(async { Err(MemoryError::Corrupt("vector index offline".to_string())) })
        }

        fn search_keyword(
            &self,
            query: &str,
            k: usize,
            content_type: Option<ContentType>,
        ) -> StoreFuture<'_, MemoryResult<Vec<IndexHit>>> {
            self.0.search_keyword(query, k, content_type)
        }

        fn delete(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<bool>> {
            self.0.delete(id)
        }

        fn without_embedding(
            &self,
            limit: usize,
        ) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
            self.0.without_embedding(limit)
        }

        fn stats(&self) -> StoreFuture<'_, MemoryResult<StoreStats>> {
            self.0.stats()
        }
    }

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new("embedding", 100.0))
    }

    async fn put(
        store: &Arc<dyn MemoryStore>,
        content: &str,
        content_type: ContentType,
        embedding: Option<Vec<f32>>,
    ) -> MemoryId {
        let mut record = MemoryRecord::new(content, content_type, BTreeSet::new()).unwrap();
        record.embedding = embedding;
        store.insert(record).await.unwrap()
    }

    #[tokio::test]
    async fn keyword_only_when_provider_is_down() {
        let store = store().await;
        let id = put(&store, "rusqlite busy timeout tuning", ContentType::Learning, None).await;
        let embedder = Arc::new(FailingEmbedder::new(DIMS));
        let searcher = HybridSearcher::new(
            Arc::clone(&store),
            embedder.clone(),
            limiter(),
            FusionConfig::default(),
        );

        let hits = searcher.search("busy timeout", None, 10, 0.03).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, id);
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn vector_index_failure_falls_back_to_keywords() {
        let inner = store().await;
        let embedder = Arc::new(HashEmbedder::new(DIMS));
        let text = "wal checkpoint starvation";
        let id = put(&inner, text, ContentType::Error, Some(embedder.vector_for(text))).await;
        let store: Arc<dyn MemoryStore> = Arc::new(VectorIndexDown(inner));

        let searcher = HybridSearcher::new(
            store,
            embedder.clone(),
            limiter(),
            FusionConfig::default(),
        );
        let hits = searcher.search("checkpoint", None, 10, 0.03).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, id);
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn record_found_by_both_indexes_ranks_first() {
        let store = store().await;
        let embedder = Arc::new(HashEmbedder::new(DIMS));
        let both_text = "vector index partition key";
        let both = put(
            &store,
            both_text,
            ContentType::Decision,
            Some(embedder.vector_for(both_text)),
        )
        .await;
        put(&store, "partition the work queue", ContentType::Decision, None).await;

        let searcher =
            HybridSearcher::new(Arc::clone(&store), embedder, limiter(), FusionConfig::default());
        let hits = searcher
            .search("vector index partition key", None, 5, 0.03)
            .await
            .unwrap();

        assert_eq!(hits[0].record.id, both);
        assert!(hits[0].relevance > hits[1].relevance);
        assert!(hits.iter().all(|hit| hit.relevance <= 1.0));
    }

    #[tokio::test]
    async fn empty_bucket_skips_the_embedder() {
        let store = store().await;
        put(&store, "cache eviction by recency", ContentType::Code, None).await;
        let embedder = Arc::new(HashEmbedder::new(DIMS));
        let drained = Arc::new(RateLimiter::new("embedding", 1.0));
        assert!(drained.try_acquire());

        let searcher = HybridSearcher::new(
            Arc::clone(&store),
            embedder.clone(),
            drained,
            FusionConfig::default(),
        );
        let hits = searcher.search("eviction", None, 10, 0.03).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn blank_query_and_no_matches_are_empty() {
        let store = store().await;
        let searcher = HybridSearcher::new(
            store,
            Arc::new(HashEmbedder::new(DIMS)),
            limiter(),
            FusionConfig::default(),
        );
        assert!(searcher.search("   ", None, 10, 0.03).await.unwrap().is_empty());
        assert!(searcher.search("nothing", None, 10, 0.03).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn min_relevance_and_filter_apply() {
        let store = store().await;
        put(&store, "flaky test in ci", ContentType::Error, None).await;
        put(&store, "flaky network in ci", ContentType::Output, None).await;
        let searcher = HybridSearcher::new(
            Arc::clone(&store),
            Arc::new(FailingEmbedder::new(DIMS)),
            limiter(),
            FusionConfig::default(),
        );

        let filtered = searcher
            .search("flaky", Some(ContentType::Error), 10, 0.03)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record.content_type, ContentType::Error);

        // Keyword-only relevance tops out at w_kw / (w_vec + w_kw) = 0.4.
        let strict = searcher.search("flaky", None, 10, 0.5).await.unwrap();
        assert!(strict.is_empty());
    }
}
