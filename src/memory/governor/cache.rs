//! LRU cache for search results.
//!
//! Entries are stamped with the store generation current when their search started. Any write
//! bumps the generation, so older entries read as misses and are dropped on lookup.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use tokio::sync::Mutex;

use crate::memory::core::content_type::ContentType;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::retrieval::hybrid_search::SearchHit;

/// Cache key: everything that changes a search answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SearchKey {
    query: String,
    content_type: Option<ContentType>,
    limit: usize,
    min_relevance_bits: u64,
}

impl SearchKey {
    /// Build a key. The query is trimmed so incidental whitespace shares an entry.
    #[must_use]
    pub fn new(
        query: &str,
        content_type: Option<ContentType>,
        limit: usize,
        min_relevance: f64,
    ) -> Self {
        Self {
            query: query.trim().to_string(),
            content_type,
            limit,
            min_relevance_bits: min_relevance.to_bits(),
        }
    }
}

/// Bounded, recency-evicted search cache.
pub struct SearchCache {
    entries: Mutex<LruCache<SearchKey, (u64, Vec<SearchHit>)>>,
    generation: AtomicU64,
}

impl SearchCache {
    /// Create a cache holding at most `capacity` result sets.
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            MemoryError::InvalidConfig("governor.cache_capacity must be > 0".to_string())
        })?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            generation: AtomicU64::new(0),
        })
    }

    /// Store generation to stamp a search with before it runs.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mark every cached result set stale. Called after each successful write.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Look up and mark as most recently used. Stale entries are removed and miss.
    pub async fn get(&self, key: &SearchKey) -> Option<Vec<SearchHit>> {
        let current = self.generation();
        let mut entries = self.entries.lock().await;
        let stale = match entries.get(key) {
            Some((generation, hits)) if *generation == current => return Some(hits.clone()),
            Some(_) => true,
            None => false,
        };
        if stale {
            entries.pop(key);
        }
        None
    }

    /// Insert results computed at `generation`, evicting the least recently used entry when
    /// full. Results from before the latest write are discarded.
    pub async fn put(&self, key: SearchKey, hits: Vec<SearchHit>, generation: u64) {
        let mut entries = self.entries.lock().await;
        if generation == self.generation() {
            entries.put(key, (generation, hits));
        }
    }

    /// Number of current result sets.
    pub async fn len(&self) -> usize {
        let current = self.generation();
        self.entries
            .lock()
            .await
            .iter()
            .filter(|(_, (generation, _))| *generation == current)
            .count()
    }

    /// True when nothing current is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
