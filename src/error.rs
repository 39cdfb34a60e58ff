//! Error types for the Geogate service.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Geogate operations.
#[derive(Error, Debug)]
pub enum GeogateError {
    /// Configuration-related errors, including a store that is unusable at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied an identifier the limiter cannot key on
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Shared counter store failures (connectivity, timeout, malformed replies)
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for Geogate operations.
pub type Result<T> = std::result::Result<T, GeogateError>;
