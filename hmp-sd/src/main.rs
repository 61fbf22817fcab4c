//! Stream Delivery server (hmp-sd) - Main entry point
//!
//! Resolves tracks through the configured extractors and serves them in
//! progressive (GET) and buffered (POST) mode.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hmp_common::config::{locate_config_file, TomlConfig};
use hmp_sd::config::{Config, Overrides};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for hmp-sd
#[derive(Parser, Debug)]
#[command(name = "hmp-sd")]
#[command(about = "Stream delivery server for the hybrid music player")]
#[command(version)]
struct Args {
    /// Config file (overrides HMP_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "HMP_SD_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "HMP_SD_PORT")]
    port: Option<u16>,

    /// Allowed CORS origin (`*` for any)
    #[arg(long, env = "HMP_SD_CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Upper bound in bytes for one buffered-mode payload
    #[arg(long, env = "HMP_SD_MAX_BUFFERED_BYTES")]
    max_buffered_bytes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before tracing exists so [logging] can pick the default filter
    let toml = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},hmp_sd=debug,tower_http=debug", toml.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match locate_config_file(args.config.as_deref()) {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => warn!("No config directory available, using defaults"),
    }

    let config = Config::from_toml(&toml)
        .context("Invalid configuration")?
        .with_overrides(Overrides {
            host: args.host,
            port: args.port,
            cors_origin: args.cors_origin,
            max_buffered_bytes: args.max_buffered_bytes,
        });

    info!(
        "Starting hmp-sd v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("HMP_GIT_HASH")
    );

    hmp_sd::api::server::run(config, shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
