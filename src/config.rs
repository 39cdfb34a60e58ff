//! Configuration management for Geogate.
//!
//! Configuration is layered: an optional YAML file, then environment variables
//! prefixed with `GEOGATE_` using `__` to descend into sections
//! (`GEOGATE_STORE__HOST`, `GEOGATE_LIMITER__LIMIT`, ...).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GeogateError, Result};
use crate::ratelimit::{WindowConfig, DEFAULT_LIMIT, DEFAULT_WINDOW_SIZE_SECS};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GEOGATE";

/// Main configuration for the Geogate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeogateConfig {
    /// Deployment environment name, attached to every log line
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Sliding window parameters
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Shared counter store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for GeogateConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            limiter: LimiterConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_environment() -> String {
    "local".to_string()
}

/// Sliding window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum requests admitted per rolling window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Number of one-second buckets in the rolling window
    #[serde(default = "default_window_size")]
    pub window_size_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_size_secs: default_window_size(),
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_window_size() -> u64 {
    DEFAULT_WINDOW_SIZE_SECS
}

impl LimiterConfig {
    /// Validate into a window configuration.
    pub fn window(&self) -> Result<WindowConfig> {
        WindowConfig::new(self.limit, self.window_size_secs)
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis host
    #[serde(default)]
    pub host: Option<String>,

    /// Redis port
    #[serde(default = "default_store_port")]
    pub port: u16,

    /// Redis password
    #[serde(default)]
    pub password: Option<String>,

    /// Redis logical database
    #[serde(default)]
    pub db: i64,

    /// Connect over plain TCP instead of TLS
    #[serde(default)]
    pub disable_tls: bool,

    /// Deadline for each store command in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_store_port(),
            password: None,
            db: 0,
            disable_tls: false,
            command_timeout_ms: default_command_timeout(),
        }
    }
}

fn default_store_port() -> u16 {
    6380
}

fn default_command_timeout() -> u64 {
    2000
}

impl StoreConfig {
    /// Per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GeogateConfig {
    /// Load configuration from an optional YAML file overlaid with environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder =
                builder.add_source(::config::File::from(path).format(::config::FileFormat::Yaml));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GeogateError::Config(format!("Failed to load configuration: {}", e)))?;

        let config: GeogateConfig = settings
            .try_deserialize()
            .map_err(|e| GeogateError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GeogateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GeogateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the parameters that would otherwise fail later at construction.
    pub fn validate(&self) -> Result<()> {
        self.limiter.window()?;
        if self.store.command_timeout_ms == 0 {
            return Err(GeogateError::Config(
                "store.command_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// A copy safe to print: the store password is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.store.password.is_some() {
            config.store.password = Some("***".to_string());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeogateConfig::from_yaml("{}").unwrap();
        assert_eq!(config.environment, "local");
        assert_eq!(config.limiter.limit, 10);
        assert_eq!(config.limiter.window_size_secs, 3);
        assert_eq!(config.store.port, 6380);
        assert_eq!(config.store.db, 0);
        assert!(!config.store.disable_tls);
        assert_eq!(config.store.command_timeout(), Duration::from_secs(2));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
environment: production
limiter:
  limit: 50
  window_size_secs: 5
store:
  host: redis.internal
  port: 6379
  password: hunter2
  db: 2
  disable_tls: true
logging:
  level: debug
  format: json
"#;
        let config = GeogateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.environment, "production");
        assert_eq!(config.store.host.as_deref(), Some("redis.internal"));
        assert_eq!(config.store.port, 6379);
        assert!(config.store.disable_tls);
        assert_eq!(config.logging.format, LogFormat::Json);

        let window = config.limiter.window().unwrap();
        assert_eq!(window.limit(), 50);
        assert_eq!(window.ttl_secs(), 10);
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = r#"
limiter:
  window_size_secs: 0
"#;
        assert!(matches!(
            GeogateConfig::from_yaml(yaml),
            Err(GeogateError::Config(_))
        ));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
limiter:
  limit: 0
"#;
        assert!(matches!(
            GeogateConfig::from_yaml(yaml),
            Err(GeogateError::Config(_))
        ));
    }

    // The only test that touches GEOGATE_* variables or calls `load`, since the
    // process environment is shared by every test thread.
    #[test]
    fn test_load_from_file_then_env_overrides() {
        let path =
            std::env::temp_dir().join(format!("geogate-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "environment: staging\nlimiter:\n  limit: 7\nstore:\n  host: cache\n",
        )
        .unwrap();

        let config = GeogateConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.limiter.limit, 7);
        assert_eq!(config.limiter.window_size_secs, 3);
        assert_eq!(config.store.host.as_deref(), Some("cache"));
        assert_eq!(config.store.password, None);

        let overrides = [
            ("GEOGATE_STORE__HOST", "redis.env.internal"),
            ("GEOGATE_LIMITER__LIMIT", "42"),
            ("GEOGATE_STORE__PASSWORD", "12345"),
            ("GEOGATE_STORE__DISABLE_TLS", "true"),
        ];
        for (name, value) in overrides {
            std::env::set_var(name, value);
        }

        let result = GeogateConfig::load(Some(path.as_path()));

        for (name, _) in overrides {
            std::env::remove_var(name);
        }
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.store.host.as_deref(), Some("redis.env.internal"));
        assert_eq!(config.limiter.limit, 42);
        assert_eq!(config.limiter.window_size_secs, 3);
        assert_eq!(config.store.password.as_deref(), Some("12345"));
        assert!(config.store.disable_tls);
    }

    #[test]
    fn test_oversized_window_rejected() {
        let yaml = r#"
limiter:
  window_size_secs: 18446744073709551615
"#;
        assert!(matches!(
            GeogateConfig::from_yaml(yaml),
            Err(GeogateError::Config(ref msg)) if msg.contains("at most")
        ));
    }

    #[test]
    fn test_redacted_masks_password() {
        let mut config = GeogateConfig::default();
        config.store.password = Some("hunter2".to_string());

        let redacted = config.redacted();
        assert_eq!(redacted.store.password.as_deref(), Some("***"));
        assert_eq!(config.store.password.as_deref(), Some("hunter2"));
    }
}
