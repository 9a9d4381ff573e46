//! Trailing-edge debouncer keyed by caller.
//!
//! Every call takes a ticket and waits out the window. When it wakes, it runs only if its
//! ticket is still the newest for its key; otherwise a later call superseded it.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::memory::governor::outcome::{Outcome, SkipReason};

/// Per-key trailing debouncer.
#[derive(Debug)]
pub struct Debouncer<K: Eq + Hash> {
    window: Duration,
    latest: DashMap<K, u64>,
    tickets: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// Create a debouncer with the given quiet window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            latest: DashMap::new(),
            tickets: AtomicU64::new(0),
        }
    }

    /// Run `op` after the window unless another call for `key` arrives first.
    pub async fn run<T, F, Fut>(&self, key: K, op: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest.insert(key.clone(), ticket);

        tokio::time::sleep(self.window).await;

        // Only the newest ticket clears the entry, which returns the key to idle.
        if self.latest.remove_if(&key, |_, newest| *newest == ticket).is_none() {
            debug!(?key, "debounced");
            return Outcome::Skipped(SkipReason::Debounced);
        }

        Outcome::Executed(op().await)
    }

    /// Keys with a call waiting out its window.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.latest.len()
    }
}
