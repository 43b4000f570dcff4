//! Error types for the caching layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching layer.
///
/// Only two things can genuinely go wrong when talking to the store:
/// the store is unreachable, or it answered with something we cannot
/// interpret. Serialization failures are surfaced separately so callers
/// can tell a broken payload apart from a broken connection.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The store could not be reached (connection refused, dropped, or timed out)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with a malformed or unexpected response
    #[error("Store protocol error: {0}")]
    Protocol(String),

    /// A value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Redis Error Classification ==
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
        {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::Protocol(err.to_string())
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching layer.
pub type Result<T> = std::result::Result<T, CacheError>;
