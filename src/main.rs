//! Hardware sensor metric exporter.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use hwexport::{ExportConfig, ExportManager, SysinfoSource, init_tracing};

/// Hardware sensor metric exporter.
#[derive(Parser, Debug)]
#[command(name = "hwexport")]
#[command(about = "Export hardware sensor metrics to Graphite, Prometheus, InfluxDB, or TimescaleDB")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ExportConfig::load_from_file(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!("Starting hardware exporter");

    let source = Arc::new(SysinfoSource::new());
    let manager = ExportManager::start(&config, source).await?;

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    manager.shutdown().await;

    info!("Exporter stopped");
    Ok(())
}
