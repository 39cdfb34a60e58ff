use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use geogate::config::{GeogateConfig, LogFormat, LoggingConfig};
use geogate::ratelimit::{build_limiter, RateLimiterBackend};

/// Sliding-window admission control backed by a shared Redis counter store.
#[derive(Debug, Parser)]
#[command(name = "geogate", version, about)]
struct Cli {
    /// YAML configuration file; GEOGATE_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run admission checks for an identifier against the shared store
    Probe {
        /// Identifier to rate limit (IP address, API key, user id)
        identifier: String,

        /// Number of checks to perform
        #[arg(short = 'n', long, default_value_t = 1)]
        requests: u32,

        /// Pause between checks in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// Print one JSON object per decision
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GeogateConfig::load(cli.config.as_deref())?;

    init_tracing(&config.logging);

    let instance = uuid::Uuid::new_v4();
    let span = info_span!("geogate", environment = %config.environment, instance = %instance);

    run(cli.command, config).instrument(span).await
}

async fn run(command: Command, config: GeogateConfig) -> anyhow::Result<()> {
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match command {
        Command::Config => {
            print!("{}", serde_yaml::to_string(&config.redacted())?);
        }
        Command::Probe {
            identifier,
            requests,
            interval_ms,
            json,
        } => {
            let limiter: Arc<dyn RateLimiterBackend> = Arc::new(build_limiter(&config).await?);

            let interval = Duration::from_millis(interval_ms);
            tokio::select! {
                result = probe(limiter, &identifier, requests, interval, json) => result?,
                _ = shutdown_signal() => {}
            }
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn probe(
    limiter: Arc<dyn RateLimiterBackend>,
    identifier: &str,
    requests: u32,
    interval: Duration,
    json: bool,
) -> anyhow::Result<()> {
    let mut admitted = 0u32;

    for i in 1..=requests {
        let admission = match limiter.check(identifier).await {
            Ok(admission) => admission,
            Err(e) => {
                warn!(error = %e, request = i, "Admission check failed");
                return Err(e.into());
            }
        };

        if admission.admitted {
            admitted += 1;
        }

        if json {
            println!("{}", serde_json::to_string(&admission)?);
        } else {
            println!(
                "#{:<4} {:<8} bucket={} current={} window={}/{} remaining={}",
                i,
                if admission.admitted { "ADMIT" } else { "REJECT" },
                admission.bucket,
                admission.current_count,
                admission.window_count,
                admission.limit,
                admission.remaining(),
            );
        }

        if i < requests && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    info!(identifier = %identifier, requests, admitted, "Probe finished");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping probe");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping probe");
        }
    }
}
