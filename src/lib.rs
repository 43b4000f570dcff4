//! Tagcache - Redis-backed caching and coordination layer
//!
//! Cache-aside orchestration, tag-based invalidation, batched operations,
//! hit/miss accounting, and a distributed lock built on the store's atomic
//! primitives. Store failures degrade every cache call to a miss or a no-op;
//! they never propagate to the caller.

pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod lock;
pub mod store;

pub use cache::{CacheEngine, StatsSnapshot, WarmEntry};
pub use config::Config;
pub use error::{CacheError, Result};
pub use health::{HealthReport, HealthStatus, StatusReport, StatusReporter};
pub use lock::DistributedLock;
pub use store::{MemoryStore, RedisStore, SetOp, Store};
