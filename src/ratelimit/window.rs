//! Window parameters and per-second bucket keys.

use crate::error::{GeogateError, Result};

/// Default maximum requests admitted per rolling window.
pub const DEFAULT_LIMIT: u64 = 10;
/// Default number of one-second buckets in the rolling window.
pub const DEFAULT_WINDOW_SIZE_SECS: u64 = 3;
/// Widest accepted window, one day.
pub const MAX_WINDOW_SIZE_SECS: u64 = 86_400;

/// Separator between the identifier and the epoch second in a bucket key.
pub const KEY_SEPARATOR: char = '#';

/// Fixed parameters of a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    limit: u64,
    window_size_secs: u64,
}

impl WindowConfig {
    /// Create a window configuration. Both parameters must be positive and the
    /// window may not exceed [`MAX_WINDOW_SIZE_SECS`].
    pub fn new(limit: u64, window_size_secs: u64) -> Result<Self> {
        if limit == 0 {
            return Err(GeogateError::Config("limit must be positive".to_string()));
        }
        if window_size_secs == 0 {
            return Err(GeogateError::Config(
                "window_size_secs must be positive".to_string(),
            ));
        }
        if window_size_secs > MAX_WINDOW_SIZE_SECS {
            return Err(GeogateError::Config(format!(
                "window_size_secs must be at most {}, got {}",
                MAX_WINDOW_SIZE_SECS, window_size_secs
            )));
        }
        Ok(Self {
            limit,
            window_size_secs,
        })
    }

    /// Maximum requests admitted per rolling window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of trailing one-second buckets, current one included.
    pub fn window_size_secs(&self) -> u64 {
        self.window_size_secs
    }

    /// Expiry applied to a bucket on its first write.
    ///
    /// Twice the window, so no bucket still inside the window is evicted before it is read.
    pub fn ttl_secs(&self) -> u64 {
        self.window_size_secs * 2
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_size_secs: DEFAULT_WINDOW_SIZE_SECS,
        }
    }
}

/// One identifier's counter for one epoch second.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Caller identifier (address, account id, ...)
    pub identifier: String,
    /// Epoch second
    pub bucket: i64,
}

impl BucketKey {
    /// Create a new bucket key.
    pub fn new(identifier: &str, bucket: i64) -> Self {
        Self {
            identifier: identifier.to_string(),
            bucket,
        }
    }

    /// The key for the same identifier `secs` seconds earlier.
    pub fn previous(&self, secs: i64) -> Self {
        Self {
            identifier: self.identifier.clone(),
            bucket: self.bucket - secs,
        }
    }

    /// Convert to the store key.
    /// Format: "{identifier}#{bucket}"
    pub fn to_store_key(&self) -> String {
        format!("{}{}{}", self.identifier, KEY_SEPARATOR, self.bucket)
    }
}
