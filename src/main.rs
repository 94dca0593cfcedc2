//! Mini Disk Cache - maintenance tool
//!
//! Inspects and maintains one cache under `CACHE_ROOT`. Keys and values are
//! handled as raw bytes, so any cache can be maintained without knowing its
//! types.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_disk_cache::codec::BytesSerializer;
use mini_disk_cache::{spawn_refresh_task, CacheProvider, Config};

/// Maintenance tool for a disk-backed blob cache
#[derive(Parser)]
#[command(name = "mini_disk_cache")]
#[command(about = "Inspect and maintain a disk-backed blob cache")]
struct Cli {
    /// Cache name (a directory under CACHE_ROOT)
    cache: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Print entry count, size and counters as JSON
    #[default]
    Stats,
    /// Evict entries until the cache fits its limits
    Prune,
    /// Delete every entry
    Clear,
    /// Refresh and prune periodically until interrupted
    Watch,
}

/// Main entry point for the maintenance tool.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Parse arguments and load configuration from environment variables
/// 3. Open the named cache under the configured root
/// 4. Run the requested command; `watch` runs until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_disk_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    info!(
        "Configuration loaded: root={}, max_entry_size={}, max_total_size={}, timeout={}s, refresh_interval={}s",
        config.root.display(),
        config.max_entry_size,
        config.max_total_size,
        config.timeout,
        config.refresh_interval
    );

    let provider = CacheProvider::<Vec<u8>, Vec<u8>>::from_config(
        &config,
        Arc::new(BytesSerializer),
        Arc::new(BytesSerializer),
    );
    let cache = provider
        .get(&cli.cache)
        .with_context(|| format!("Failed to open cache '{}'", cli.cache))?;

    match cli.command.unwrap_or_default() {
        Command::Stats => {
            let stats = cache.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Prune => {
            let removed = cache.prune()?;
            info!(removed, "Prune complete");
        }
        Command::Clear => {
            cache.clear()?;
            info!(cache = %cli.cache, "Cache cleared");
        }
        Command::Watch => {
            let handle = spawn_refresh_task(Arc::clone(&cache), config.refresh_interval);
            info!("Background refresh task started");

            shutdown_signal().await?;
            handle.abort();
            warn!("Refresh task aborted");
        }
    }

    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to install Ctrl+C handler")?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    Ok(())
}
