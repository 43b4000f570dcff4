//! Cache Module
//!
//! Cache-aside engine with TTL management, tag-based invalidation, batched
//! operations and hit/miss statistics.

mod engine;
mod stats;


// Re-export public types
pub use engine::{CacheEngine, WarmEntry, DEFAULT_TTL_SECS, MAX_KEY_LENGTH};
pub use stats::{EngineStats, StatsSnapshot};
