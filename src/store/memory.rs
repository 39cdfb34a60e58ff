//! In-process counter store.
//!
//! Follows the same contract as the Redis store (lazy creation, per-key TTL,
//! expired keys read as absent) but lives inside a single process. Useful for
//! single-instance deployments and as the store behind limiter tests.
//!
//! Bucket keys are written once and then abandoned, so writes also sweep
//! expired keys, at most once per clock second.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{CounterStore, StoreError, StoreResult};
use crate::ratelimit::{Clock, SystemClock};

#[derive(Debug, Default, Clone)]
struct Entry {
    value: i64,
    /// TTL as last set, in seconds
    ttl_secs: Option<u64>,
    /// Epoch second at which the key disappears
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A TTL-aware counter store held in memory.
pub struct InMemoryCounterStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    expire_calls: AtomicUsize,
    /// Clock second of the last sweep
    last_sweep: AtomicI64,
}

impl InMemoryCounterStore {
    /// Create a store that expires keys against the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that expires keys against the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            expire_calls: AtomicUsize::new(0),
            last_sweep: AtomicI64::new(i64::MIN),
        }
    }

    /// Current value of a live key.
    pub fn value(&self, key: &str) -> Option<i64> {
        let now = self.clock.now_secs();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value)
    }

    /// TTL most recently set on a live key.
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_secs();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.ttl_secs)
    }

    /// Epoch second at which a key expires.
    pub fn expires_at(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(|e| e.expires_at)
    }

    /// All live keys and their values, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        let now = self.clock.now_secs();
        self.entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| (e.key().clone(), e.value().value))
            .collect()
    }

    /// Number of keys held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `expire` calls received.
    pub fn expire_calls(&self) -> usize {
        self.expire_calls.load(Ordering::SeqCst)
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_at(self.clock.now_secs())
    }

    fn purge_at(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Sweep expired keys unless a sweep already ran this second.
    /// Must not be called while holding a reference into `entries`.
    fn sweep(&self, now: i64) {
        let last = self.last_sweep.load(Ordering::Acquire);
        if now <= last {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let removed = self.purge_at(now);
            if removed > 0 {
                trace!(removed, "Swept expired in-memory counters");
            }
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCounterStore")
            .field("keys", &self.len())
            .field("expire_calls", &self.expire_calls())
            .finish()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let now = self.clock.now_secs();
        self.sweep(now);

        let mut entry = self.entries.entry(key.to_string()).or_default();

        if entry.is_expired(now) {
            *entry = Entry::default();
        }

        entry.value = entry
            .value
            .checked_add(delta)
            .ok_or_else(|| StoreError::Malformed {
                key: key.to_string(),
                reason: "increment would overflow".to_string(),
            })?;

        trace!(key = %key, value = entry.value, "Incremented in-memory counter");
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        self.expire_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now_secs();
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| StoreError::Malformed {
                key: key.to_string(),
                reason: format!("ttl {} out of range", ttl_secs),
            })?;

        self.entries.remove_if(key, |_, e| e.is_expired(now));
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.ttl_secs = Some(ttl_secs);
            entry.expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        let now = self.clock.now_secs();
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        Ok(self.entries.get(key).map(|e| e.value))
    }
}
