//! In-Memory Store Backend
//!
//! HashMap-backed implementation of the `Store` trait with the same observable
//! semantics as the Redis adapter: millisecond-stamped expiry, lazy removal of
//! expired entries, glob key enumeration and an atomic conditional delete.
//! Used by the test suite and usable for single-process local runs.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{CacheError, Result};
use crate::store::{SetOp, Store};

// == Stored Entry ==
/// A value with its expiration timestamp.
#[derive(Debug, Clone)]
struct StoredEntry {
    /// The stored value
    value: String,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    expires_at: Option<u64>,
}

impl StoredEntry {
    /// Creates a new entry with optional TTL in seconds.
    fn new(value: String, ttl_seconds: Option<u64>) -> Self {
        let expires_at = ttl_seconds.map(|ttl| current_timestamp_ms() + ttl * 1000);
        Self { value, expires_at }
    }

    /// An entry is expired once the current time reaches the expiration time.
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    /// Remaining TTL in whole seconds, or None if no expiration is set.
    fn ttl_remaining(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let now = current_timestamp_ms();
            if expires > now {
                (expires - now) / 1000
            } else {
                0
            }
        })
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Matches a key against a `*` glob pattern.
///
/// Literal segments between wildcards must appear in order; a pattern without
/// a trailing `*` anchors its last segment at the end of the key.
fn pattern_matches(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == key;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let first = segments[0];
    let last = segments[segments.len() - 1];

    if !key.starts_with(first) {
        return false;
    }
    if key.len() < first.len() + last.len() || !key.ends_with(last) {
        return false;
    }

    // Middle segments must appear in order inside the unanchored region
    let mut remaining = &key[first.len()..key.len() - last.len()];
    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match remaining.find(segment) {
            Some(pos) => remaining = &remaining[pos + segment.len()..],
            None => return false,
        }
    }
    true
}

// == Memory Store ==
/// In-process store backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                // Lazy removal, mirroring server-side expiry
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoredEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            match entries.remove(key) {
                Some(entry) if !entry.is_expired() => removed += 1,
                _ => {}
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(matches!(entries.get(key), Some(entry) if !entry.is_expired()))
    }

    async fn increment_by(&self, key: &str, n: i64) -> Result<i64> {
        let mut entries = self.entries.write().await;
        let (current, expires_at) = match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                let parsed: i64 = entry.value.parse().map_err(|_| {
                    CacheError::Protocol(format!("value at {} is not an integer", key))
                })?;
                (parsed, entry.expires_at)
            }
            _ => (0, None),
        };
        let next = current + n;
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn decrement_by(&self, key: &str, n: i64) -> Result<i64> {
        self.increment_by(key, -n).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && pattern_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<i64> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                Ok(entry.ttl_remaining().map(|ttl| ttl as i64).unwrap_or(-1))
            }
            _ => Ok(-1),
        }
    }

    async fn set_expiry(&self, key: &str, ttl: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(current_timestamp_ms() + ttl * 1000);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_many(&self, ops: &[SetOp]) -> Result<()> {
        let mut entries = self.entries.write().await;
        for op in ops {
            entries.insert(op.key.clone(), StoredEntry::new(op.value.clone(), op.ttl));
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| match entries.get(key) {
                Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
                _ => None,
            })
            .collect())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if matches!(entries.get(key), Some(entry) if !entry.is_expired()) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredEntry::new(value.to_string(), Some(ttl)),
        );
        Ok(true)
    }

    async fn conditional_delete(&self, key: &str, expected: &str) -> Result<bool> {
        // Compare and delete under one write guard, matching the script's atomicity
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() && entry.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        let _ = self.entries.read().await;
        Ok(start.elapsed())
    }

    async fn key_count(&self) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries.values().filter(|entry| !entry.is_expired()).count() as u64)
    }

    async fn memory_bytes(&self) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .map(|(key, entry)| (key.len() + entry.value.len()) as u64)
            .sum())
    }
}
