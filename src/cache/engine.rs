//! Cache Engine Module
//!
//! Cache-aside orchestration over the store adapter: typed get/set with TTL,
//! tag indexing and invalidation, batched reads and writes, cache warming,
//! and hit/miss accounting.
//!
//! The engine's central contract is that cache unavailability degrades
//! performance, never correctness: every store failure is absorbed here and
//! converted to a miss or a no-op, so the caller's request path survives a
//! dead cache. Only caller-supplied fetchers may propagate errors.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::stats::{EngineStats, StatsSnapshot};
use crate::health::{HealthReport, HealthStatus};
use crate::store::{SetOp, Store};

// == Public Constants ==
/// TTL applied when the caller does not specify one, in seconds
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Prefix of the secondary keyspace used for tag membership
const TAG_PREFIX: &str = "tag:";

// == Warm Entry ==
/// One unit of work for [`CacheEngine::warm_cache`]: a key, an optional TTL,
/// and the fetch that produces its value.
pub struct WarmEntry<T> {
    key: String,
    ttl: Option<u64>,
    fetcher: BoxFuture<'static, anyhow::Result<T>>,
}

impl<T> WarmEntry<T> {
    /// Creates a warm entry from any future producing the value.
    pub fn new<F>(key: impl Into<String>, ttl: Option<u64>, fetcher: F) -> Self
    where
        F: std::future::Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            ttl,
            fetcher: Box::pin(fetcher),
        }
    }
}

// == Cache Engine ==
/// Cache-aside engine over a store adapter.
///
/// Holds no authoritative data: everything except the hit/miss counters
/// lives in the external store, which may expire or evict any entry between
/// calls.
#[derive(Clone)]
pub struct CacheEngine {
    store: Arc<dyn Store>,
    stats: Arc<EngineStats>,
    default_ttl: u64,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates an engine over the given store with the default TTL.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            stats: Arc::new(EngineStats::new()),
            default_ttl: DEFAULT_TTL_SECS,
        }
    }

    /// Overrides the TTL applied when callers do not specify one.
    pub fn with_default_ttl(mut self, default_ttl: u64) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// Resolves a caller-supplied TTL: absent means the default, 0 means no expiry.
    fn effective_ttl(&self, ttl: Option<u64>) -> Option<u64> {
        match ttl.unwrap_or(self.default_ttl) {
            0 => None,
            secs => Some(secs),
        }
    }

    /// Keys must be non-empty and bounded; anything else is treated under the
    /// swallow policy rather than raised.
    fn key_ok(key: &str) -> bool {
        !key.is_empty() && key.len() <= MAX_KEY_LENGTH
    }

    fn index_key(tag: &str, key: &str) -> String {
        format!("{}{}:{}", TAG_PREFIX, tag, key)
    }

    // == Get ==
    /// Fetches and deserializes the value cached under `key`.
    ///
    /// Absence, a value that fails to deserialize, and a store failure all
    /// count as a miss and return `None`; this method never raises.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !Self::key_ok(key) {
            self.stats.record_miss();
            return None;
        }
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.stats.record_hit();
                    Some(value)
                }
                Err(err) => {
                    warn!(key, error = %err, "cached value failed to deserialize, treating as miss");
                    self.stats.record_miss();
                    None
                }
            },
            Ok(None) => {
                self.stats.record_miss();
                None
            }
            Err(err) => {
                warn!(key, error = %err, "cache read failed, treating as miss");
                self.stats.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Serializes and writes `value` under `key`.
    ///
    /// `ttl: None` applies the engine default; `Some(0)` stores without
    /// expiry. Failures are logged and swallowed so a dead cache never fails
    /// the caller's write path.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<u64>) {
        if !Self::key_ok(key) {
            warn!(key, "rejecting cache write for invalid key");
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "value failed to serialize, skipping cache write");
                return;
            }
        };
        if let Err(err) = self.store.set(key, &raw, self.effective_ttl(ttl)).await {
            warn!(key, error = %err, "cache write failed");
        }
    }

    // == Delete ==
    /// Removes `key` from the cache. Failures are logged and swallowed.
    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.store.delete(&[key.to_string()]).await {
            warn!(key, error = %err, "cache delete failed");
        }
    }

    // == Exists ==
    /// Returns whether `key` is currently cached; false on any store failure.
    pub async fn exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(err) => {
                warn!(key, error = %err, "cache exists check failed");
                false
            }
        }
    }

    // == TTL ==
    /// Remaining TTL of `key` in seconds, -1 when absent, without expiry, or
    /// on store failure.
    pub async fn get_ttl(&self, key: &str) -> i64 {
        match self.store.ttl_remaining(key).await {
            Ok(ttl) => ttl,
            Err(err) => {
                warn!(key, error = %err, "ttl lookup failed");
                -1
            }
        }
    }

    /// Updates the expiry of an existing key; false when absent or on failure.
    pub async fn set_expiry(&self, key: &str, ttl: u64) -> bool {
        match self.store.set_expiry(key, ttl).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(key, error = %err, "expiry update failed");
                false
            }
        }
    }

    // == Pattern Invalidation ==
    /// Removes every key matching a `*` glob pattern in one batch.
    ///
    /// Returns the number of keys actually removed; 0 on store failure.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> u64 {
        let keys = match self.store.keys_matching(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(pattern, error = %err, "pattern enumeration failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        match self.store.delete(&keys).await {
            Ok(removed) => {
                debug!(pattern, removed, "invalidated keys by pattern");
                removed
            }
            Err(err) => {
                warn!(pattern, error = %err, "pattern invalidation failed");
                0
            }
        }
    }

    /// Removes every key starting with `prefix`.
    pub async fn invalidate_by_prefix(&self, prefix: &str) -> u64 {
        self.invalidate_by_pattern(&format!("{}*", prefix)).await
    }

    /// Removes every key ending with `suffix`.
    pub async fn invalidate_by_suffix(&self, suffix: &str) -> u64 {
        self.invalidate_by_pattern(&format!("*{}", suffix)).await
    }

    // == Tagged Writes ==
    /// Writes the primary entry, then one index entry `tag:<tag>:<key>` per
    /// tag with the same TTL.
    ///
    /// The primary is written first: a crash mid-operation can leave a
    /// primary without full tag coverage, but never an index entry pointing
    /// at a primary that was never written.
    pub async fn set_with_tags<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        tags: &[&str],
    ) {
        if !Self::key_ok(key) {
            warn!(key, "rejecting tagged cache write for invalid key");
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "value failed to serialize, skipping tagged write");
                return;
            }
        };
        let effective = self.effective_ttl(ttl);
        if let Err(err) = self.store.set(key, &raw, effective).await {
            warn!(key, error = %err, "tagged cache write failed");
            return;
        }

        let index_ops: Vec<SetOp> = tags
            .iter()
            .map(|tag| SetOp {
                key: Self::index_key(tag, key),
                value: "1".to_string(),
                ttl: effective,
            })
            .collect();
        if let Err(err) = self.store.set_many(&index_ops).await {
            warn!(key, error = %err, "tag index write failed");
        }
    }

    // == Tag Invalidation ==
    /// Invalidates every entry carrying any of the given tags.
    ///
    /// Each index key `tag:<tag>:<key>` encodes its primary key in the
    /// suffix; both the primary and the index entry are deleted, so tagged
    /// entries are truly gone rather than just untagged. Returns the number
    /// of primary keys removed.
    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> u64 {
        let mut removed = 0;
        for tag in tags {
            let index_prefix = format!("{}{}:", TAG_PREFIX, tag);
            let index_keys = match self.store.keys_matching(&format!("{}*", index_prefix)).await {
                Ok(keys) => keys,
                Err(err) => {
                    warn!(tag, error = %err, "tag index enumeration failed");
                    continue;
                }
            };
            if index_keys.is_empty() {
                continue;
            }

            let primary_keys: Vec<String> = index_keys
                .iter()
                .filter_map(|index_key| index_key.strip_prefix(&index_prefix))
                .map(str::to_string)
                .collect();

            match self.store.delete(&primary_keys).await {
                Ok(count) => removed += count,
                Err(err) => warn!(tag, error = %err, "tagged primary deletion failed"),
            }
            if let Err(err) = self.store.delete(&index_keys).await {
                warn!(tag, error = %err, "tag index deletion failed");
            }
        }
        removed
    }

    // == Batched Reads ==
    /// Fetches all keys in one round trip, aligned to input order.
    ///
    /// Each element is counted independently as a hit or miss; a store
    /// failure yields all-absent.
    pub async fn get_multiple<T: DeserializeOwned>(&self, keys: &[&str]) -> Vec<Option<T>> {
        let owned: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        match self.store.get_many(&owned).await {
            Ok(raws) => raws
                .into_iter()
                .zip(keys)
                .map(|(raw, key)| match raw {
                    Some(raw) => match serde_json::from_str(&raw) {
                        Ok(value) => {
                            self.stats.record_hit();
                            Some(value)
                        }
                        Err(err) => {
                            warn!(key, error = %err, "cached value failed to deserialize, treating as miss");
                            self.stats.record_miss();
                            None
                        }
                    },
                    None => {
                        self.stats.record_miss();
                        None
                    }
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "batched cache read failed, treating all as misses");
                keys.iter()
                    .map(|_| {
                        self.stats.record_miss();
                        None
                    })
                    .collect()
            }
        }
    }

    // == Batched Writes ==
    /// Writes all entries in one pipelined round trip. Entries that fail to
    /// serialize are skipped; store failures are swallowed.
    pub async fn set_multiple<T: Serialize>(&self, entries: &[(&str, T, Option<u64>)]) {
        let mut ops = Vec::with_capacity(entries.len());
        for (key, value, ttl) in entries {
            if !Self::key_ok(key) {
                warn!(key, "rejecting batched cache write for invalid key");
                continue;
            }
            match serde_json::to_string(value) {
                Ok(raw) => ops.push(SetOp {
                    key: key.to_string(),
                    value: raw,
                    ttl: self.effective_ttl(*ttl),
                }),
                Err(err) => {
                    warn!(key, error = %err, "value failed to serialize, skipping entry")
                }
            }
        }
        if let Err(err) = self.store.set_many(&ops).await {
            warn!(error = %err, "batched cache write failed");
        }
    }

    // == Cache-Aside ==
    /// Returns the cached value under `key`, or runs `fetcher` and caches
    /// its result (tagged when `tags` is non-empty).
    ///
    /// Fetcher errors propagate unchanged: the cache cannot invent a value.
    /// There is no single-flight de-duplication, so concurrent misses on a
    /// cold key may each run the fetcher; callers wanting exactly-once
    /// fetches can wrap this with a
    /// [`DistributedLock`](crate::lock::DistributedLock) around the
    /// fetch-and-set step.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<u64>,
        tags: &[&str],
        fetcher: F,
    ) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }
        let value = fetcher().await?;
        if tags.is_empty() {
            self.set(key, &value, ttl).await;
        } else {
            self.set_with_tags(key, &value, ttl, tags).await;
        }
        Ok(value)
    }

    /// Batched cache-aside: one batched read, one `batch_fetcher` call for
    /// the full miss set, one pipelined write-back.
    ///
    /// Keys the fetcher does not return are simply absent from the result
    /// map. Fetcher errors propagate; cache-layer failures do not.
    pub async fn get_or_set_multiple<T, F, Fut>(
        &self,
        keys: &[&str],
        ttl: Option<u64>,
        tags: &[&str],
        batch_fetcher: F,
    ) -> anyhow::Result<HashMap<String, T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Vec<String>) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<HashMap<String, T>>>,
    {
        let cached: Vec<Option<T>> = self.get_multiple(keys).await;

        let mut result = HashMap::new();
        let mut missing = Vec::new();
        for (key, value) in keys.iter().zip(cached) {
            match value {
                Some(value) => {
                    result.insert(key.to_string(), value);
                }
                None => missing.push(key.to_string()),
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }

        let mut fetched = batch_fetcher(missing.clone()).await?;

        let effective = self.effective_ttl(ttl);
        let mut ops = Vec::new();
        for key in &missing {
            let Some(value) = fetched.get(key) else {
                continue;
            };
            match serde_json::to_string(value) {
                Ok(raw) => {
                    ops.push(SetOp {
                        key: key.clone(),
                        value: raw,
                        ttl: effective,
                    });
                    for tag in tags {
                        ops.push(SetOp {
                            key: Self::index_key(tag, key),
                            value: "1".to_string(),
                            ttl: effective,
                        });
                    }
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "fetched value failed to serialize, skipping write-back")
                }
            }
        }
        if let Err(err) = self.store.set_many(&ops).await {
            warn!(error = %err, "cache write-back failed");
        }

        for key in missing {
            if let Some(value) = fetched.remove(&key) {
                result.insert(key, value);
            }
        }
        Ok(result)
    }

    // == Cache Warming ==
    /// Runs all fetchers concurrently and caches each successful result.
    ///
    /// A failing fetcher is logged and skipped without aborting its
    /// siblings. Returns the number of entries actually warmed.
    pub async fn warm_cache<T: Serialize>(&self, entries: Vec<WarmEntry<T>>) -> usize {
        let warmers = entries.into_iter().map(|entry| async move {
            let WarmEntry { key, ttl, fetcher } = entry;
            match fetcher.await {
                Ok(value) => {
                    self.set(&key, &value, ttl).await;
                    true
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "warm fetch failed, skipping entry");
                    false
                }
            }
        });
        join_all(warmers).await.into_iter().filter(|ok| *ok).count()
    }

    // == Stats ==
    /// Snapshot combining the in-memory counters with live store
    /// introspection. Introspection failures zero the store-derived fields;
    /// this method never fails outright.
    pub async fn get_stats(&self) -> StatsSnapshot {
        let total_keys = match self.store.key_count().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "key count introspection failed");
                0
            }
        };
        let memory_usage_bytes = match self.store.memory_bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "memory introspection failed");
                0
            }
        };
        StatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            hit_rate: self.stats.hit_rate(),
            total_keys,
            memory_usage_bytes,
        }
    }

    // == Health ==
    /// Pings the store and classifies the result.
    pub async fn health_check(&self) -> HealthReport {
        match self.store.ping().await {
            Ok(latency) => HealthReport {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency.as_millis() as u64),
                error: None,
            },
            Err(err) => HealthReport {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(err.to_string()),
            },
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        name: String,
    }

    fn test_engine() -> (CacheEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CacheEngine::new(store.clone()), store)
    }

    fn profile() -> Profile {
        Profile {
            id: 42,
            name: "ada".to_string(),
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (engine, _) = test_engine();

        engine.set("user:42", &profile(), None).await;
        let cached: Option<Profile> = engine.get("user:42").await;

        assert_eq!(cached, Some(profile()));
    }

    #[tokio::test]
    async fn test_get_miss_counts() {
        let (engine, _) = test_engine();

        let cached: Option<Profile> = engine.get("missing").await;
        assert!(cached.is_none());

        let stats = engine.get_stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_get_undeserializable_is_miss() {
        let (engine, store) = test_engine();

        store.set("user:42", "{broken json", None).await.unwrap();
        let cached: Option<Profile> = engine.get("user:42").await;

        assert!(cached.is_none());
        assert_eq!(engine.get_stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_set_ttl_zero_means_no_expiry() {
        let (engine, store) = test_engine();

        engine.set("pinned", &1u64, Some(0)).await;
        assert_eq!(store.ttl_remaining("pinned").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_set_applies_default_ttl() {
        let (engine, store) = test_engine();

        engine.set("user:42", &profile(), None).await;
        let ttl = store.ttl_remaining("user:42").await.unwrap();
        assert!(ttl > 0 && ttl <= DEFAULT_TTL_SECS as i64);
    }

    #[tokio::test]
    async fn test_invalid_key_is_noop() {
        let (engine, store) = test_engine();
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        engine.set(&long_key, &profile(), None).await;
        assert_eq!(store.key_count().await.unwrap(), 0);

        let cached: Option<Profile> = engine.get(&long_key).await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_by_prefix() {
        let (engine, _) = test_engine();

        engine.set("user:1", &1u64, None).await;
        engine.set("user:2", &2u64, None).await;
        engine.set("session:1", &3u64, None).await;

        assert_eq!(engine.invalidate_by_prefix("user:").await, 2);
        assert!(!engine.exists("user:1").await);
        assert!(engine.exists("session:1").await);
    }

    #[tokio::test]
    async fn test_invalidate_by_tags_removes_primary() {
        let (engine, _) = test_engine();

        engine
            .set_with_tags("user:42", &profile(), None, &["users", "premium"])
            .await;
        assert!(engine.exists("user:42").await);

        let removed = engine.invalidate_by_tags(&["users"]).await;
        assert_eq!(removed, 1);

        // Both the primary and every index entry must be gone
        let cached: Option<Profile> = engine.get("user:42").await;
        assert!(cached.is_none());
        assert!(!engine.exists("tag:users:user:42").await);
    }

    #[tokio::test]
    async fn test_tag_index_shares_ttl() {
        let (engine, store) = test_engine();

        engine
            .set_with_tags("user:42", &profile(), Some(120), &["users"])
            .await;

        let primary_ttl = store.ttl_remaining("user:42").await.unwrap();
        let index_ttl = store.ttl_remaining("tag:users:user:42").await.unwrap();
        assert!(primary_ttl > 0);
        assert!(index_ttl >= primary_ttl - 1);
    }

    #[tokio::test]
    async fn test_get_multiple_preserves_order() {
        let (engine, _) = test_engine();

        engine.set("b", &"value_b".to_string(), None).await;
        let values: Vec<Option<String>> = engine.get_multiple(&["a", "b", "c"]).await;

        assert_eq!(values, vec![None, Some("value_b".to_string()), None]);
    }

    #[tokio::test]
    async fn test_get_or_set_skips_fetcher_on_hit() {
        let (engine, _) = test_engine();

        let first = engine
            .get_or_set("user:42", None, &[], || async { Ok(profile()) })
            .await
            .unwrap();
        assert_eq!(first, profile());

        let second: Profile = engine
            .get_or_set("user:42", None, &[], || async {
                panic!("fetcher must not run on a warm cache")
            })
            .await
            .unwrap();
        assert_eq!(second, profile());
    }

    #[tokio::test]
    async fn test_get_or_set_propagates_fetcher_error() {
        let (engine, _) = test_engine();

        let result: anyhow::Result<Profile> = engine
            .get_or_set("user:42", None, &[], || async {
                Err(anyhow::anyhow!("upstream down"))
            })
            .await;

        assert!(result.is_err());
        assert!(!engine.exists("user:42").await);
    }

    #[tokio::test]
    async fn test_get_or_set_multiple_fetches_only_missing() {
        let (engine, _) = test_engine();
        engine.set("a", &"cached_a".to_string(), None).await;

        let result = engine
            .get_or_set_multiple(&["a", "b", "c"], None, &[], |missing| async move {
                assert_eq!(missing, vec!["b".to_string(), "c".to_string()]);
                let mut fetched = HashMap::new();
                fetched.insert("b".to_string(), "fetched_b".to_string());
                // "c" is not produced by the fetcher and stays absent
                Ok(fetched)
            })
            .await
            .unwrap();

        assert_eq!(result.get("a"), Some(&"cached_a".to_string()));
        assert_eq!(result.get("b"), Some(&"fetched_b".to_string()));
        assert!(!result.contains_key("c"));

        // The fetched value is now cached
        assert!(engine.exists("b").await);
    }

    #[tokio::test]
    async fn test_warm_cache_isolates_failures() {
        let (engine, _) = test_engine();

        let warmed = engine
            .warm_cache(vec![
                WarmEntry::new("warm:1", None, async { Ok("one".to_string()) }),
                WarmEntry::new("warm:2", None, async {
                    Err(anyhow::anyhow!("source offline"))
                }),
                WarmEntry::new("warm:3", None, async { Ok("three".to_string()) }),
            ])
            .await;

        assert_eq!(warmed, 2);
        assert!(engine.exists("warm:1").await);
        assert!(!engine.exists("warm:2").await);
        assert!(engine.exists("warm:3").await);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let (engine, _) = test_engine();

        engine.set("k", &1u64, None).await;
        let _: Option<u64> = engine.get("k").await;
        let _: Option<u64> = engine.get("missing").await;

        let stats = engine.get_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert!(stats.total_keys >= 1);
    }

    #[tokio::test]
    async fn test_health_check_healthy() {
        let (engine, _) = test_engine();

        let report = engine.health_check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.latency_ms.is_some());
        assert!(report.error.is_none());
    }
}
