//! Cache Statistics Module
//!
//! Tracks hit/miss accounting for the cache engine. Counters are atomic so
//! concurrent requests can record lookups without a write lock; they live
//! for the lifetime of the engine instance and reset only on restart.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Engine Stats ==
/// Process-lifetime hit/miss counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Number of lookups that found a deserializable value
    hits: AtomicU64,
    /// Number of lookups that found nothing usable
    misses: AtomicU64,
}

impl EngineStats {
    // == Constructor ==
    /// Creates a new EngineStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Current hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Current miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    // == Hit Rate ==
    /// Cache hit rate as a percentage, rounded to 2 decimals.
    ///
    /// Returns hits / (hits + misses) * 100, or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64 * 10000.0).round() / 100.0
        }
    }
}

// == Stats Snapshot ==
/// Point-in-time view of cache performance, combining the in-memory counters
/// with live store introspection.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (absent, expired, or unreadable)
    pub misses: u64,
    /// Hit rate percentage, rounded to 2 decimals
    pub hit_rate: f64,
    /// Approximate number of keys held by the store (0 when introspection fails)
    pub total_keys: u64,
    /// Approximate store memory usage in bytes (0 when introspection fails)
    pub memory_usage_bytes: u64,
}
