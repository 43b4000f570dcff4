//! Distributed Lock Module
//!
//! Named mutual-exclusion lock backed by the store's atomic primitives.
//! Acquisition is one set-if-not-exists write; release is one conditional
//! delete keyed on the holder's token. The lease TTL bounds how long a
//! crashed holder can block others; there is no client-side check-then-act
//! anywhere in this path.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::store::Store;

// == Public Constants ==
/// Lease applied when the caller does not specify one, in seconds
pub const DEFAULT_LEASE_SECS: u64 = 30;

// == Distributed Lock ==
/// Acquire/release of named locks shared across processes.
///
/// Ownership is determined solely by token equality, never by caller
/// identity: a release succeeds only while the stored token still matches,
/// so a holder whose lease expired cannot remove a lock re-acquired by
/// someone else.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn Store>,
}

impl DistributedLock {
    // == Constructor ==
    /// Creates a lock manager over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn lock_key(resource: &str) -> String {
        format!("lock:{}", resource)
    }

    /// Tokens are unique per attempt, not per process.
    fn mint_token() -> String {
        format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4()
        )
    }

    // == Acquire ==
    /// Attempts to take the lock on `resource` for `lease_secs` seconds
    /// ([`DEFAULT_LEASE_SECS`] when `None`).
    ///
    /// Returns the holder token on success, `None` when the lock is held
    /// elsewhere. No polling or backoff is built in; callers retry on their
    /// own schedule.
    ///
    /// # Errors
    /// Store transport failures surface as errors: "held by someone else"
    /// and "store unreachable" are different answers and must stay
    /// distinguishable.
    pub async fn acquire(&self, resource: &str, lease_secs: Option<u64>) -> Result<Option<String>> {
        let token = Self::mint_token();
        let lease = lease_secs.unwrap_or(DEFAULT_LEASE_SECS);
        let acquired = self
            .store
            .set_if_absent(&Self::lock_key(resource), &token, lease)
            .await?;
        if acquired {
            debug!(resource, lease, "lock acquired");
            Ok(Some(token))
        } else {
            debug!(resource, "lock already held");
            Ok(None)
        }
    }

    // == Release ==
    /// Releases the lock on `resource` if `token` still matches the stored
    /// value.
    ///
    /// Returns false when the lock had already expired (and possibly been
    /// re-acquired by another party). That is a normal result meaning "I no
    /// longer definitely hold it", not an error.
    pub async fn release(&self, resource: &str, token: &str) -> Result<bool> {
        let released = self
            .store
            .conditional_delete(&Self::lock_key(resource), token)
            .await?;
        if released {
            debug!(resource, "lock released");
        } else {
            debug!(resource, "release skipped, token no longer matches");
        }
        Ok(released)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let lock = test_lock();

        let token = lock.acquire("res", None).await.unwrap();
        assert!(token.is_some());

        // Second acquisition fails while the first lease is live
        assert!(lock.acquire("res", None).await.unwrap().is_none());

        // After release the lock is free again
        assert!(lock.release("res", &token.unwrap()).await.unwrap());
        assert!(lock.acquire("res", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_with_wrong_token() {
        let lock = test_lock();

        let token = lock.acquire("res", None).await.unwrap().unwrap();

        assert!(!lock.release("res", "stale-token").await.unwrap());
        // The real holder can still release
        assert!(lock.release("res", &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_expiry_frees_lock() {
        let lock = test_lock();

        let stale = lock.acquire("res", Some(1)).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        // Lease elapsed: a new holder can acquire
        let fresh = lock.acquire("res", None).await.unwrap();
        assert!(fresh.is_some());

        // The stale token no longer releases the re-acquired lock
        assert!(!lock.release("res", &stale).await.unwrap());
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = DistributedLock::mint_token();
        let b = DistributedLock::mint_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_lock_key_namespace() {
        assert_eq!(DistributedLock::lock_key("report:42"), "lock:report:42");
    }
}
