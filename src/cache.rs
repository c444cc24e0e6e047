//! Optional memoization of per-segment statistics shared between cloned metric states.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use ahash::AHashMap;

use crate::bleu::SegmentStats;

/// Thread-safe cache of [`SegmentStats`] keyed by `(segment index, n-best id)`.
///
/// A cache is injected into one [`BleuMetric`](crate::BleuMetric) and shared by every state
/// (and clone) that metric creates, so branches of a search that revisit the same n-best entry
/// skip recounting its n-grams. It is scoped to one batch run; scores are identical with or
/// without it.
#[derive(Debug, Default)]
pub struct SegmentStatsCache {
    entries: Mutex<AHashMap<(usize, usize), SegmentStats>>,
    hits: AtomicUsize,
}

impl SegmentStatsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached statistics for `key`, computing and storing them on a miss.
    pub fn get_or_insert_with<F>(&self, key: (usize, usize), compute: F) -> SegmentStats
    where
        F: FnOnce() -> SegmentStats,
    {
        if let Some(stats) = self.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return stats.clone();
        }
        // Computed outside the lock; a concurrent miss on the same key computes equal stats.
        let stats = compute();
        self.lock().entry(key).or_insert_with(|| stats.clone());
        stats
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of lookups answered from the cache.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<(usize, usize), SegmentStats>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
