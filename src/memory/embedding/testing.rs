//! Embedder doubles shared by unit tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::memory::embedding::embedder::{EmbedFuture, Embedder, EmbeddingUnavailable};

/// Deterministic bag-of-words embedder: texts sharing words land close together.
pub struct HashEmbedder {
    ndims: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(ndims: usize) -> Self {
        Self {
            ndims,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering, to make the uncached path measurably slow.
    pub fn slow(ndims: usize, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(ndims)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.ndims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = usize::try_from(hasher.finish() % self.ndims as u64).unwrap_or(0);
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> EmbedFuture<'_, Result<Vec<f32>, EmbeddingUnavailable>> {
        let text = text.to_string();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if text.trim().is_empty() {
                return Err(EmbeddingUnavailable::EmptyInput);
            }
            Ok(self.vector_for(&text))
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

/// Provider that is always down.
pub struct FailingEmbedder {
    ndims: usize,
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new(ndims: usize) -> Self {
        Self {
            ndims,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> EmbedFuture<'_, Result<Vec<f32>, EmbeddingUnavailable>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingUnavailable::Transport(
                "connection refused".to_string(),
            ))
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}
