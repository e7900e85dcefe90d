//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of adapter cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by an existing adapter.
    pub hits: u64,
    /// Lookups that ran the generator.
    pub misses: u64,
    /// Adapters successfully generated.
    pub generations: u64,
    /// Generator calls that failed.
    pub generation_failures: u64,
    /// Partitions reclaimed by sweeps or explicit teardown.
    pub domains_released: u64,
    /// Live domain partitions.
    pub domain_count: u64,
    /// Adapters across all partitions.
    pub adapter_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    generations: AtomicU64,
    generation_failures: AtomicU64,
    domains_released: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn generated(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn generation_failed(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn released(&self, domains: u64) {
        self.domains_released.fetch_add(domains, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, domain_count: u64, adapter_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            domains_released: self.domains_released.load(Ordering::Relaxed),
            domain_count,
            adapter_count,
        }
    }
}
