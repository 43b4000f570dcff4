//! Redis Store Adapter
//!
//! ConnectionManager-backed implementation of the `Store` trait. Every
//! operation is a single round trip bounded by the configured request
//! timeout; the conditional delete runs as a server-side Lua script so the
//! read-compare-delete is indivisible.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::debug;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::store::{SetOp, Store};

// == Conditional Delete Script ==
/// Deletes KEYS[1] only when its current value equals ARGV[1].
///
/// Returns the number of keys removed (0 or 1). GET and DEL run inside one
/// script invocation, so no other client can slip in between the compare
/// and the delete.
const CONDITIONAL_DELETE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

// == Redis Store ==
/// Store adapter speaking the Redis protocol over a managed connection.
pub struct RedisStore {
    /// Shared multiplexed connection, cheap to clone per operation
    conn: ConnectionManager,
    /// Upper bound on any single round trip
    request_timeout: Duration,
    /// Preparsed conditional delete script (invoked via EVALSHA after first use)
    conditional_delete: Script,
}

impl RedisStore {
    // == Constructor ==
    /// Connects to the store described by `config`.
    ///
    /// # Errors
    /// Returns `CacheError::Unavailable` when the store cannot be reached
    /// within the connection timeout, or `CacheError::Protocol` when the
    /// URL is malformed.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Client::open(config.redis_url.as_str())?;

        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                CacheError::Unavailable(format!(
                    "connection to {} timed out after {:?}",
                    config.redis_url, config.connect_timeout
                ))
            })??;

        debug!(url = %config.redis_url, "connected to redis store");

        Ok(Self {
            conn,
            request_timeout: config.request_timeout,
            conditional_delete: Script::new(CONDITIONAL_DELETE_SCRIPT),
        })
    }

    // == Timeout Wrapper ==
    /// Bounds a single store round trip by the request timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Unavailable(format!(
                "request timed out after {:?}",
                self.request_timeout
            ))),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(secs) => {
                let _: () = self.bounded(conn.set_ex(key, value, secs)).await?;
            }
            None => {
                let _: () = self.bounded(conn.set(key, value)).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = self.bounded(conn.del(keys)).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = self.bounded(conn.exists(key)).await?;
        Ok(exists)
    }

    async fn increment_by(&self, key: &str, n: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = self.bounded(conn.incr(key, n)).await?;
        Ok(value)
    }

    async fn decrement_by(&self, key: &str, n: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = self.bounded(conn.decr(key, n)).await?;
        Ok(value)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = self.bounded(conn.keys(pattern)).await?;
        Ok(keys)
    }

    async fn ttl_remaining(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        // TTL replies -2 for a missing key and -1 for a key without expiry;
        // both collapse to -1 in this contract.
        let ttl: i64 = self.bounded(conn.ttl(key)).await?;
        Ok(if ttl < 0 { -1 } else { ttl })
    }

    async fn set_expiry(&self, key: &str, ttl: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let updated: bool = self.bounded(conn.expire(key, ttl as i64)).await?;
        Ok(updated)
    }

    async fn set_many(&self, entries: &[SetOp]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for entry in entries {
            match entry.ttl {
                Some(secs) => {
                    pipe.cmd("SET")
                        .arg(&entry.key)
                        .arg(&entry.value)
                        .arg("EX")
                        .arg(secs)
                        .ignore();
                }
                None => {
                    pipe.cmd("SET").arg(&entry.key).arg(&entry.value).ignore();
                }
            }
        }
        let _: () = self.bounded(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = self
            .bounded(redis::cmd("MGET").arg(keys).query_async(&mut conn))
            .await?;
        Ok(values)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .bounded(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn conditional_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .bounded(
                self.conditional_delete
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(removed == 1)
    }

    async fn ping(&self) -> Result<Duration> {
        let mut conn = self.conn.clone();
        let start = Instant::now();
        let _: String = self
            .bounded(redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(start.elapsed())
    }

    async fn key_count(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .bounded(redis::cmd("DBSIZE").query_async(&mut conn))
            .await?;
        Ok(count)
    }

    async fn memory_bytes(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let info: String = self
            .bounded(redis::cmd("INFO").arg("memory").query_async(&mut conn))
            .await?;
        parse_used_memory(&info).ok_or_else(|| {
            CacheError::Protocol("INFO memory reply missing used_memory field".to_string())
        })
    }
}

// == INFO Parsing ==
/// Extracts the `used_memory` byte count from an INFO memory reply.
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory:"))
        .and_then(|raw| raw.trim().parse().ok())
}
