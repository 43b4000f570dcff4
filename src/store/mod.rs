//! Store Adapter Module
//!
//! Thin protocol client to the remote key-value store. The `Store` trait is
//! the only seam through which the rest of the crate touches the network;
//! `RedisStore` is the production implementation, `MemoryStore` an in-process
//! one for tests and local runs.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// == Batched Write Operation ==
/// A single write inside a pipelined batch.
///
/// `ttl: None` stores the entry without expiry.
#[derive(Debug, Clone)]
pub struct SetOp {
    pub key: String,
    pub value: String,
    pub ttl: Option<u64>,
}

// == Store Trait ==
/// Contract for the remote key-value store.
///
/// Each operation is a single round trip. Calls never retry internally;
/// retry and degradation policy belong to the caller. Every call is bounded
/// by the adapter's request timeout, whose expiry surfaces as
/// [`CacheError::Unavailable`](crate::error::CacheError::Unavailable).
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches the raw value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`, with expiry after `ttl` seconds when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()>;

    /// Removes the given keys. Returns how many actually existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Checks whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically adds `n` to the integer stored under `key`. Returns the new value.
    async fn increment_by(&self, key: &str, n: i64) -> Result<i64>;

    /// Atomically subtracts `n` from the integer stored under `key`. Returns the new value.
    async fn decrement_by(&self, key: &str, n: i64) -> Result<i64>;

    /// Enumerates all keys matching a `*` glob pattern.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Returns the remaining TTL of `key` in seconds, or -1 when the key is
    /// absent or has no expiry.
    async fn ttl_remaining(&self, key: &str) -> Result<i64>;

    /// Sets the expiry of an existing key. Returns false when the key is absent.
    async fn set_expiry(&self, key: &str, ttl: u64) -> Result<bool>;

    /// Submits all writes as one pipelined round trip.
    ///
    /// Ordering within the batch is guaranteed; atomicity across the batch is
    /// not. A transport failure mid-batch may leave it partially applied.
    async fn set_many(&self, entries: &[SetOp]) -> Result<()>;

    /// Fetches all keys in one round trip, aligned to input order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Writes `value` under `key` with expiry only if the key does not exist.
    ///
    /// Returns true when the write happened. This is one atomic server-side
    /// operation, never a client-side check-then-act.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: u64) -> Result<bool>;

    /// Deletes `key` only if its current value equals `expected`, as one
    /// indivisible read-compare-delete. Returns true when the key was removed.
    async fn conditional_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Round-trips to the store and returns the measured latency.
    async fn ping(&self) -> Result<Duration>;

    /// Approximate number of keys currently held by the store.
    async fn key_count(&self) -> Result<u64>;

    /// Approximate memory used by the store, in bytes.
    async fn memory_bytes(&self) -> Result<u64>;
}
