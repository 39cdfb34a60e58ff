//! Sliding-window admission controller backed by a shared counter store.
//!
//! Every instance increments the caller's bucket for the current epoch second
//! in the shared store, then sums the trailing buckets of the window. Nothing
//! is held in process between calls, so any number of instances can answer
//! for the same caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::window::{BucketKey, WindowConfig};
use crate::error::{GeogateError, Result};
use crate::store::{CounterStore, StoreError};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Value of the current-second bucket after this request was counted
    pub current_count: u64,
    /// Requests observed across the window. Equals `current_count` when the
    /// current bucket alone was already over the limit.
    pub window_count: u64,
    /// Configured limit
    pub limit: u64,
    /// Epoch second of the bucket that was incremented
    pub bucket: i64,
}

impl Admission {
    /// Requests left in the window before rejections start.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.window_count)
    }
}

/// A distributed sliding-window rate limiter.
///
/// Requests are always counted, even when rejected, so retries against a
/// rejected identifier keep consuming its budget.
pub struct SlidingWindowLimiter<S: CounterStore> {
    /// Shared counter store.
    store: S,
    /// Limit and window size.
    window: WindowConfig,
    /// Source of the current epoch second.
    clock: Arc<dyn Clock>,
}

impl<S: CounterStore + std::fmt::Debug> std::fmt::Debug for SlidingWindowLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("store", &self.store)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl<S: CounterStore> SlidingWindowLimiter<S> {
    /// Create a limiter that buckets requests by wall-clock second.
    pub fn new(store: S, window: WindowConfig) -> Self {
        Self::with_clock(store, window, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit clock.
    pub fn with_clock(store: S, window: WindowConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            window,
            clock,
        }
    }

    /// Get the window configuration.
    pub fn window(&self) -> WindowConfig {
        self.window
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Count a request for `identifier` and decide whether it is admitted.
    pub async fn check(&self, identifier: &str) -> Result<Admission> {
        if identifier.is_empty() {
            return Err(GeogateError::InvalidIdentifier(
                "identifier must not be empty".to_string(),
            ));
        }

        let now = self.clock.now_secs();
        let key = BucketKey::new(identifier, now);
        let store_key = key.to_store_key();
        let limit = self.window.limit();

        trace!(
            identifier = %identifier,
            bucket = now,
            limit = limit,
            window_size_secs = self.window.window_size_secs(),
            "Checking sliding window rate limit"
        );

        let current_count = to_count(&store_key, self.store.increment(&store_key, 1).await?)?;

        if current_count == 1 {
            self.store.expire(&store_key, self.window.ttl_secs()).await?;
            debug!(
                key = %store_key,
                ttl_secs = self.window.ttl_secs(),
                "Set expiry on new bucket"
            );
        }

        if current_count > limit {
            // The window sum can only be larger, skip the history reads
            debug!(
                identifier = %identifier,
                count = current_count,
                limit = limit,
                "Per-second bucket over limit"
            );
            return Ok(Admission {
                admitted: false,
                current_count,
                window_count: current_count,
                limit,
                bucket: now,
            });
        }

        let window_count = current_count.saturating_add(self.previous_buckets_total(&key).await?);
        let admitted = window_count <= limit;

        if !admitted {
            debug!(
                identifier = %identifier,
                count = window_count,
                limit = limit,
                "Sliding window over limit"
            );
        }

        Ok(Admission {
            admitted,
            current_count,
            window_count,
            limit,
            bucket: now,
        })
    }

    /// Whether a request from `identifier` may proceed.
    ///
    /// Store failures are returned as errors, never as a decision.
    pub async fn can_serve(&self, identifier: &str) -> Result<bool> {
        Ok(self.check(identifier).await?.admitted)
    }

    /// Sum of the buckets preceding `current` inside the window. Missing buckets count as zero.
    async fn previous_buckets_total(&self, current: &BucketKey) -> Result<u64> {
        let window_size = i64::try_from(self.window.window_size_secs()).map_err(|_| {
            GeogateError::Config(format!(
                "window_size_secs {} out of range",
                self.window.window_size_secs()
            ))
        })?;
        let keys: Vec<String> = (1..window_size)
            .map(|delta| current.previous(delta).to_store_key())
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }

        let values = self.store.get_many(&keys).await?;

        let mut total: u64 = 0;
        for (key, value) in keys.iter().zip(values) {
            if let Some(value) = value {
                total = total.saturating_add(to_count(key, value)?);
            }
        }
        Ok(total)
    }
}

/// Store counters are signed; a negative value means someone else wrote the key.
fn to_count(key: &str, value: i64) -> std::result::Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Malformed {
        key: key.to_string(),
        reason: format!("negative counter value {}", value),
    })
}

#[async_trait]
impl<S: CounterStore + 'static> super::backend::RateLimiterBackend for SlidingWindowLimiter<S> {
    async fn check(&self, identifier: &str) -> Result<Admission> {
        SlidingWindowLimiter::check(self, identifier).await
    }
}
