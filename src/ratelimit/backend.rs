//! Rate limiter trait for abstracting over admission controller implementations.

use async_trait::async_trait;

use super::sliding_window::Admission;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The calling layer (an HTTP handler, a probe, a test) holds an
/// `Arc<dyn RateLimiterBackend>` and never needs to know which store sits behind it.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Count a request for `identifier` and return the full decision.
    async fn check(&self, identifier: &str) -> Result<Admission>;

    /// Whether a request from `identifier` may proceed.
    async fn can_serve(&self, identifier: &str) -> Result<bool> {
        Ok(self.check(identifier).await?.admitted)
    }
}
