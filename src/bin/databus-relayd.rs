//! Databus relay daemon
//!
//! Joins the datagram databus as one peer and persists every event named
//! `host|service|field` to day-row storage.
//!
//! # CLI Commands
//!
//! - `start` - Run the daemon (default if no command specified)
//! - `check-config` - Validate configuration and print a summary
//!
//! # Configuration
//!
//! The daemon reads configuration from:
//! 1. `--config` path
//! 2. `DATABUS_CONFIG` environment variable (path to TOML file)
//! 3. `./databus.toml` in current directory
//! 4. Default configuration
//!
//! `DATABUS_*` environment variables override file values, and `--listen`
//! / `--relay` override both.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kuba_databus::{
    bus::DatabusService,
    config::{BackendKind, Config},
    sink::StorageSink,
    storage::{MemoryBackend, RedisBackend, StorageBackend, StorageEngine},
    Error, Result,
};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// =============================================================================
// CLI Definition
// =============================================================================

/// Databus relay daemon
#[derive(Parser)]
#[command(name = "databus-relayd")]
#[command(version)]
#[command(about = "Unix datagram databus peer with slot-addressed storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (overrides DATABUS_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the listen socket path
    #[arg(short, long, global = true)]
    listen: Option<PathBuf>,

    /// Override the relay socket path
    #[arg(short, long, global = true)]
    relay: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Start,

    /// Validate configuration without starting the daemon
    CheckConfig,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Resolve the configuration file path, if any
fn config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = &cli.config {
        return Some(path.clone());
    }
    if let Ok(path) = std::env::var("DATABUS_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let local = Path::new("databus.toml");
    local.exists().then(|| local.to_path_buf())
}

/// Load, override and validate configuration
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(config_path(cli).as_deref())?;

    if let Some(listen) = &cli.listen {
        config.bus.listen_path = listen.clone();
    }
    if let Some(relay) = &cli.relay {
        config.bus.relay_path = relay.clone();
    }

    config.validate().map_err(Error::Configuration)?;
    Ok(config)
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

/// Validate configuration and print summary
fn cmd_check_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    println!("Configuration is valid!");
    println!();
    println!("Bus Settings:");
    println!("  Listen socket: {}", config.bus.listen_path.display());
    println!("  Relay socket: {}", config.bus.relay_path.display());
    if let Some(announce) = &config.bus.announce_path {
        println!("  Announce to: {}", announce.display());
    }
    println!("  Batch size: {}", config.bus.batch_size);
    println!("  Queue limit: {} ({:?})", config.bus.queue_limit, config.bus.overflow);
    println!();
    println!("Storage Settings:");
    println!("  Enabled: {}", config.storage.enabled);
    println!("  Backend: {:?}", config.storage.backend);
    println!("  Consistency: {}", config.storage.consistency);
    println!("  Time basis: {:?}", config.storage.time_basis);
    println!();
    println!("Retry: {} retries, {:?} apart", config.retry.retries, config.retry.wait);
    println!("Log level: {}", config.logging.level);

    Ok(())
}

/// Build the storage engine for the configured backend
async fn init_storage(config: &Config) -> Result<StorageEngine> {
    let backend: Arc<dyn StorageBackend> = match config.storage.backend {
        BackendKind::Memory => {
            debug!("Using in-memory storage backend");
            Arc::new(MemoryBackend::new())
        },
        BackendKind::Redis => {
            debug!(replicas = config.storage.replicas, "Connecting to Redis storage backend");
            Arc::new(RedisBackend::connect(config.redis_config()).await?)
        },
    };

    Ok(StorageEngine::new(backend, config.storage_config()))
}

/// Graceful shutdown signal handler
///
/// A failed handler installation is logged and that signal is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {},
            Err(e) => {
                warn!(
                    error = %e,
                    "Ctrl+C handler installation failed - graceful shutdown unavailable"
                );
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(
                    error = %e,
                    "SIGTERM handler installation failed - SIGTERM shutdown unavailable"
                );
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => return cmd_check_config(&cli),
        Some(Commands::Start) | None => {},
    }

    let config = load_config(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.logging.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("Starting databus-relayd v{}", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (service, handle) = DatabusService::new(config.bus_config());

    let sink = if config.storage.enabled {
        let engine = init_storage(&config).await?;
        let (sink, task) = StorageSink::spawn(
            engine,
            config.retry_policy(),
            config.storage.sink_buffer,
            shutdown_tx.subscribe(),
        );
        handle.attach("storage", &sink).await?;
        info!(backend = ?config.storage.backend, "Storage sink attached");
        Some((sink, task))
    } else {
        None
    };

    let bus_task = tokio::spawn(service.run(shutdown_tx.subscribe()));

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    if let Err(e) = bus_task.await {
        warn!(error = %e, "Databus task failed");
    }
    if let Some((sink, task)) = sink {
        if let Err(e) = task.await {
            warn!(error = %e, "Storage sink task failed");
        }
        let stats = sink.stats();
        info!(stored = stats.stored, failed = stats.failed, "Storage sink drained");
    }

    info!("Shutdown complete");
    Ok(())
}
