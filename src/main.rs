//! conda-firewall - allowlist-filtering mirror and gatekeeper proxy for conda channels
//!
//! This is the main entry point for the conda-firewall application.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use conda_firewall::config::Config;
use conda_firewall::error::AppError;
use conda_firewall::logging::init_tracing;
use conda_firewall::server::Server;
use conda_firewall::sync;

/// conda-firewall - allowlist-filtering mirror and gatekeeper proxy for conda channels
#[derive(Parser, Debug)]
#[command(name = "conda-firewall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CONDA_FIREWALL_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh raw catalogs, filter them and publish the results
    Sync {
        /// Download every catalog regardless of cache age
        #[arg(long)]
        force: bool,
    },
    /// Serve filtered catalogs and forward allowed package downloads
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        channels = config.channels.len(),
        "Starting conda-firewall"
    );

    match args.command {
        Command::Sync { force } => run_sync(&config, force).await?,
        Command::Serve => run_server(config).await?,
    }

    Ok(())
}

async fn run_sync(config: &Config, force: bool) -> Result<(), AppError> {
    let report = sync::run(config, force).await?;

    info!(
        downloaded = report.refresh.downloaded.len(),
        cached = report.refresh.cached.len(),
        download_errors = report.download_errors.len(),
        subdirs = report.subdirs_published,
        filenames = report.index.filenames.len(),
        packages = report.index.packages.len(),
        "Sync finished"
    );

    // Catalogs were published from cache; download failures still fail the command
    if let Err(e) = report.download_result() {
        warn!(failures = e.len(), "Upstream downloads failed during sync");
        return Err(e.into());
    }
    Ok(())
}

async fn run_server(config: Config) -> Result<(), AppError> {
    let config = Arc::new(config);
    let server = Server::from_config(Arc::clone(&config)).await?;

    info!(
        host = %config.server.host,
        port = %config.server.port,
        upstream = %config.upstream_host(),
        "Starting HTTP server"
    );

    server.run(shutdown_signal()).await?;

    info!("conda-firewall shutdown complete");
    Ok(())
}

/// Load configuration from file, or fall back to defaults
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
