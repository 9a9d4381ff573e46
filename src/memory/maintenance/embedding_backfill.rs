//! Background worker that embeds records stored without a vector.
//!
//! Records miss their embedding when the provider is down or the embedding bucket is empty at
//! ingest time. Each sweep takes the oldest pending records and stops early as soon as the
//! bucket runs dry, leaving the rest for the next sweep.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::memory::core::config::BackfillConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::embedding::embedder::Embedder;
use crate::memory::governor::cache::SearchCache;
use crate::memory::governor::rate_limit::RateLimiter;
use crate::memory::ingest::pipeline::{EmbeddingStatus, embed_and_attach};
use crate::memory::storage::memory_store::MemoryStore;

/// Statistics from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    /// Records examined.
    pub scanned: usize,
    /// Embeddings attached.
    pub attached: usize,
    /// Records left for a later sweep (bucket empty or provider down).
    pub deferred: usize,
    /// Records whose vector could not be stored.
    pub failed: usize,
    /// Sweep duration in milliseconds.
    pub duration_ms: u64,
}

/// Periodic embedding backfill.
pub struct EmbeddingBackfill {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    limiter: Arc<RateLimiter>,
    cache: Arc<SearchCache>,
    config: BackfillConfig,
    shutdown: Arc<Notify>,
}

impl EmbeddingBackfill {
    /// Create a new backfill worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        limiter: Arc<RateLimiter>,
        cache: Arc<SearchCache>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            limiter,
            cache,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Notifier that stops the worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("embedding backfill is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        info!(?interval, "starting embedding backfill worker");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match self.run_once().await {
                        Ok(stats) if stats.scanned > 0 => {
                            info!(
                                attached = stats.attached,
                                deferred = stats.deferred,
                                failed = stats.failed,
                                duration_ms = stats.duration_ms,
                                "backfill sweep completed"
                            );
                        }
                        Ok(_) => debug!("backfill sweep found nothing to embed"),
                        Err(err) => warn!(error = %err, "backfill sweep failed"),
                    }
                }
                () = self.shutdown.notified() => {
                    info!("embedding backfill worker shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single sweep.
    ///
    /// # Errors
    /// Returns an error if pending records cannot be listed.
    pub async fn run_once(&self) -> MemoryResult<BackfillStats> {
        let start = tokio::time::Instant::now();
        let pending = self.store.without_embedding(self.config.batch_size).await?;
        let mut stats = BackfillStats {
            scanned: pending.len(),
            ..BackfillStats::default()
        };

        for record in &pending {
            let status = embed_and_attach(
                self.store.as_ref(),
                self.embedder.as_ref(),
                &self.limiter,
                &self.cache,
                record.id,
                &record.content,
            )
            .await;
            match status {
                EmbeddingStatus::Attached { .. } => stats.attached += 1,
                EmbeddingStatus::Failed { .. } => stats.failed += 1,
                EmbeddingStatus::Deferred | EmbeddingStatus::Unavailable { .. } => {
                    // Bucket dry or provider down: the rest of the batch would fare the same.
                    stats.deferred = stats.scanned - stats.attached - stats.failed;
                    break;
                }
            }
        }

        stats.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(stats)
    }
}
