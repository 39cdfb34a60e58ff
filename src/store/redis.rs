//! Redis-backed counter store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo};
use tracing::{debug, error, info};

use super::{CounterStore, StoreError, StoreResult};
use crate::config::StoreConfig;

/// Counter store shared by every instance through a Redis server.
///
/// Uses a multiplexed, auto-reconnecting connection; every command is bounded
/// by the configured timeout and a timeout surfaces as [`StoreError::Timeout`].
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisCounterStore {
    /// Connect to the configured Redis server and verify it answers `PING`.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("no store host configured".to_string()))?;
        let scheme = if config.disable_tls { "redis" } else { "rediss" };

        let mut connection_info =
            format!("{}://{}:{}/{}", scheme, host, config.port, config.db).into_connection_info()?;
        connection_info.redis.password = config.password.clone();

        let client = Client::open(connection_info)?;
        let command_timeout = config.command_timeout();

        let mut connection =
            with_timeout("connect", command_timeout, client.get_connection_manager())
                .await
                .map_err(|e| {
                    error!(
                        host = %host,
                        port = config.port,
                        error = %e,
                        "Failed to connect to Redis server"
                    );
                    e
                })?;

        let ping = redis::cmd("PING");
        let pong: String =
            with_timeout("ping", command_timeout, ping.query_async(&mut connection)).await?;
        debug!(reply = %pong, "Redis connection test successful");

        info!(host = %host, port = config.port, db = config.db, "Connected to Redis counter store");

        Ok(Self {
            connection,
            command_timeout,
        })
    }
}

/// Run a Redis command under a deadline.
async fn with_timeout<T, F>(op: &'static str, timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout { op, timeout }),
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        with_timeout("incr", self.command_timeout, conn.incr(key, delta)).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let ttl = i64::try_from(ttl_secs).map_err(|_| StoreError::Malformed {
            key: key.to_string(),
            reason: format!("ttl {} out of range", ttl_secs),
        })?;
        let applied: bool =
            with_timeout("expire", self.command_timeout, conn.expire(key, ttl)).await?;
        if !applied {
            debug!(key = %key, "EXPIRE targeted a key that no longer exists");
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.connection.clone();
        with_timeout("get", self.command_timeout, conn.get(key)).await
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.clone();
        let mut mget = redis::cmd("MGET");
        mget.arg(keys);
        let values: Vec<Option<i64>> =
            with_timeout("mget", self.command_timeout, mget.query_async(&mut conn)).await?;

        if values.len() != keys.len() {
            return Err(StoreError::Malformed {
                key: keys.join(","),
                reason: format!("MGET returned {} values for {} keys", values.len(), keys.len()),
            });
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> StoreConfig {
        StoreConfig {
            host: Some("127.0.0.1".to_string()),
            // Port 1 is reserved (tcpmux) and not served in test environments
            port: 1,
            password: Some("secret".to_string()),
            db: 0,
            disable_tls: true,
            command_timeout_ms: 500,
        }
    }

    #[tokio::test]
    async fn test_connect_without_host_is_unavailable() {
        let config = StoreConfig {
            host: None,
            ..unreachable_config()
        };

        let err = RedisCounterStore::connect(&config).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let result = RedisCounterStore::connect(&unreachable_config()).await;
        assert!(matches!(
            result,
            Err(StoreError::Redis(_)) | Err(StoreError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_with_timeout_reports_operation() {
        let never = std::future::pending::<redis::RedisResult<i64>>();
        let err = with_timeout("incr", Duration::from_millis(10), never)
            .await
            .unwrap_err();

        match err {
            StoreError::Timeout { op, timeout } => {
                assert_eq!(op, "incr");
                assert_eq!(timeout, Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
