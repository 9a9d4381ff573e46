//! Debounce, rate limit and cache composed around engine calls.
//!
//! Governed calls never fail: every failure below this boundary is converted to
//! [`Outcome::Skipped`] and counted.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::memory::core::config::GovernorConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::governor::cache::{SearchCache, SearchKey};
use crate::memory::governor::debounce::Debouncer;
use crate::memory::governor::outcome::{Outcome, SkipReason};
use crate::memory::governor::rate_limit::RateLimiter;
use crate::memory::retrieval::hybrid_search::SearchHit;

#[derive(Debug, Default)]
struct Counters {
    executed: AtomicU64,
    cache_hits: AtomicU64,
    debounced: AtomicU64,
    rate_limited: AtomicU64,
    degraded: AtomicU64,
}

/// Snapshot of governor activity since start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GovernorStats {
    /// Operations that ran.
    pub executed: u64,
    /// Searches answered from cache.
    pub cache_hits: u64,
    /// Calls superseded within their debounce window.
    pub debounced: u64,
    /// Calls denied a token.
    pub rate_limited: u64,
    /// Operations that ran and failed.
    pub degraded: u64,
    /// Keys currently inside a debounce window.
    pub pending_debounce: usize,
    /// Cached result sets.
    pub cached_searches: usize,
}

/// Admission control for the engine.
pub struct ExecutionGovernor {
    debouncer: Debouncer<String>,
    memory_limiter: RateLimiter,
    embedding_limiter: Arc<RateLimiter>,
    cache: Arc<SearchCache>,
    counters: Counters,
}

impl ExecutionGovernor {
    /// Build the governor from config.
    ///
    /// # Errors
    /// Returns an error if the cache capacity is zero.
    pub fn new(config: &GovernorConfig) -> MemoryResult<Self> {
        Ok(Self {
            debouncer: Debouncer::new(Duration::from_millis(config.debounce_ms)),
            memory_limiter: RateLimiter::new("memory", config.memory_ops_per_second),
            embedding_limiter: Arc::new(RateLimiter::new(
                "embedding",
                config.embedding_ops_per_second,
            )),
            cache: Arc::new(SearchCache::new(config.cache_capacity)?),
            counters: Counters::default(),
        })
    }

    /// Bucket shared by every embedding request (ingest, search, backfill).
    #[must_use]
    pub fn embedding_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.embedding_limiter)
    }

    /// Search cache, shared with writers that must invalidate it.
    #[must_use]
    pub fn search_cache(&self) -> Arc<SearchCache> {
        Arc::clone(&self.cache)
    }

    /// Cached, rate-limited search.
    pub async fn search<F, Fut>(&self, key: SearchKey, op: F) -> Outcome<Vec<SearchHit>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MemoryResult<Vec<SearchHit>>>,
    {
        if let Some(hits) = self.cache.get(&key).await {
            return self.cached(&key, hits);
        }

        if !self.memory_limiter.try_acquire() {
            // Another caller may have filled the entry while this one was refused.
            if let Some(hits) = self.cache.get(&key).await {
                return self.cached(&key, hits);
            }
            return self.skip(SkipReason::RateLimited);
        }

        let generation = self.cache.generation();
        match op().await {
            Ok(hits) => {
                self.cache.put(key, hits.clone(), generation).await;
                self.counters.executed.fetch_add(1, Ordering::Relaxed);
                Outcome::Executed(hits)
            }
            Err(err) => {
                warn!(error = %err, "search degraded");
                self.skip(SkipReason::Degraded)
            }
        }
    }

    /// Rate-limited operation without caching or debouncing.
    pub async fn limited<T, F, Fut>(&self, op: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MemoryResult<T>>,
    {
        if !self.memory_limiter.try_acquire() {
            return self.skip(SkipReason::RateLimited);
        }

        match op().await {
            Ok(value) => {
                self.counters.executed.fetch_add(1, Ordering::Relaxed);
                Outcome::Executed(value)
            }
            Err(err) => {
                warn!(error = %err, "operation degraded");
                self.skip(SkipReason::Degraded)
            }
        }
    }

    /// Debounced per `key`, then rate-limited. Used for hook writes.
    pub async fn debounced<T, F, Fut>(&self, key: &str, op: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MemoryResult<T>>,
    {
        match self
            .debouncer
            .run(key.to_string(), || self.limited(op))
            .await
        {
            Outcome::Executed(inner) | Outcome::Cached(inner) => inner,
            Outcome::Skipped(reason) => self.skip(reason),
        }
    }

    /// Debounced per `key` only; `op` applies its own governance.
    pub async fn debounce<T, F, Fut>(&self, key: &str, op: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        match self.debouncer.run(key.to_string(), op).await {
            Outcome::Executed(inner) | Outcome::Cached(inner) => inner,
            Outcome::Skipped(reason) => self.skip(reason),
        }
    }

    /// Wait for a memory token. Explicit writes are delayed, never dropped.
    pub async fn admit(&self) {
        self.memory_limiter.acquire().await;
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Forget every cached search.
    pub fn invalidate(&self) {
        self.cache.invalidate();
        debug!("search cache invalidated");
    }

    /// Current counters.
    pub async fn stats(&self) -> GovernorStats {
        GovernorStats {
            executed: self.counters.executed.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            debounced: self.counters.debounced.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
            pending_debounce: self.debouncer.pending(),
            cached_searches: self.cache.len().await,
        }
    }

    fn cached(&self, key: &SearchKey, hits: Vec<SearchHit>) -> Outcome<Vec<SearchHit>> {
        debug!(?key, hits = hits.len(), "search cache hit");
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        Outcome::Cached(hits)
    }

    fn skip<T>(&self, reason: SkipReason) -> Outcome<T> {
        let counter = match reason {
            SkipReason::Debounced => &self.counters.debounced,
            SkipReason::RateLimited => &self.counters.rate_limited,
            SkipReason::Degraded => &self.counters.degraded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Outcome::Skipped(reason)
    }
}
