//! Construction of the Redis-backed limiter from configuration.

use tracing::{error, info};

use super::sliding_window::SlidingWindowLimiter;
use crate::config::GeogateConfig;
use crate::error::{GeogateError, Result};
use crate::store::RedisCounterStore;

/// Build a limiter backed by the configured Redis server.
///
/// Every failure here is a configuration fault: bad window parameters,
/// missing connection settings, or a store that does not answer at startup.
pub async fn build_limiter(
    config: &GeogateConfig,
) -> Result<SlidingWindowLimiter<RedisCounterStore>> {
    let window = config.limiter.window()?;
    let store_config = &config.store;

    let host = match store_config.host.as_deref() {
        Some(host) if !host.is_empty() => host,
        _ => {
            error!("Missing counter store host");
            return Err(GeogateError::Config("Missing store.host".to_string()));
        }
    };

    if store_config.password.as_deref().map_or(true, str::is_empty) {
        error!("Missing counter store password");
        return Err(GeogateError::Config("Missing store.password".to_string()));
    }

    info!(
        host = %host,
        port = store_config.port,
        tls = !store_config.disable_tls,
        "Starting Redis client"
    );

    let store = RedisCounterStore::connect(store_config)
        .await
        .map_err(|e| GeogateError::Config(format!("Counter store unusable: {}", e)))?;

    info!(
        limit = window.limit(),
        window_size_secs = window.window_size_secs(),
        "Sliding window rate limiter initialized"
    );

    Ok(SlidingWindowLimiter::new(store, window))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_store(host: Option<&str>, password: Option<&str>) -> GeogateConfig {
        let mut config = GeogateConfig::default();
        config.store.host = host.map(str::to_string);
        config.store.password = password.map(str::to_string);
        config.store.port = 1;
        config.store.disable_tls = true;
        config.store.command_timeout_ms = 500;
        config
    }

    #[tokio::test]
    async fn test_missing_host_is_config_error() {
        let config = config_with_store(None, Some("secret"));
        let err = build_limiter(&config).await.unwrap_err();
        assert!(matches!(err, GeogateError::Config(ref msg) if msg.contains("host")));
    }

    #[tokio::test]
    async fn test_missing_password_is_config_error() {
        let config = config_with_store(Some("127.0.0.1"), Some(""));
        let err = build_limiter(&config).await.unwrap_err();
        assert!(matches!(err, GeogateError::Config(ref msg) if msg.contains("password")));
    }

    #[tokio::test]
    async fn test_invalid_window_fails_before_connecting() {
        let mut config = config_with_store(None, None);
        config.limiter.limit = 0;
        let err = build_limiter(&config).await.unwrap_err();
        assert!(matches!(err, GeogateError::Config(ref msg) if msg.contains("limit")));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_config_error() {
        let config = config_with_store(Some("127.0.0.1"), Some("secret"));
        let err = build_limiter(&config).await.unwrap_err();
        assert!(matches!(err, GeogateError::Config(ref msg) if msg.contains("unusable")));
    }
}
