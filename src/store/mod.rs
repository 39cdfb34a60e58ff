//! Shared counter store abstraction.
//!
//! The admission controller only needs three primitives from the store:
//! atomic increment, per-key expiry and point reads. Every service instance
//! talks to the same store, so the store (not the controller) serializes
//! concurrent increments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use self::memory::InMemoryCounterStore;
pub use self::redis::RedisCounterStore;

/// Errors raised while talking to the shared counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The Redis client reported a failure (connection, protocol or type error)
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A store command did not complete within the configured timeout
    #[error("store operation `{op}` timed out after {timeout:?}")]
    Timeout {
        op: &'static str,
        timeout: Duration,
    },

    /// The store returned a value that is not a valid counter
    #[error("malformed counter at key `{key}`: {reason}")]
    Malformed { key: String, reason: String },

    /// The store cannot be reached at all
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Contract of the networked, TTL-capable counter store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add `delta` to the integer at `key` (absent keys start at 0)
    /// and return the new value.
    async fn increment(&self, key: &str, delta: i64) -> StoreResult<i64>;

    /// Set or refresh the time-to-live of `key`.
    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Read the integer at `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Read several keys, preserving order.
    ///
    /// The default issues the point reads concurrently; stores with a native
    /// multi-get override this.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        futures::future::try_join_all(keys.iter().map(|key| self.get(key))).await
    }
}

#[async_trait]
impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    async fn increment(&self, key: &str, delta: i64) -> StoreResult<i64> {
        (**self).increment(key, delta).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        (**self).expire(key, ttl_secs).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        (**self).get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        (**self).get_many(keys).await
    }
}
