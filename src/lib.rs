//! Hardware telemetry exporter.
//!
//! Samples CPU, memory, and thermal sensors and delivers the readings
//! to exactly one configured backend. Push backends run on a fixed
//! interval; the prometheus backend samples on demand per scrape:
//!
//! ```text
//! ┌─────────┐    ┌───────────┐    ┌────────────────────────────┐
//! │ Sensors │───>│ Scheduler │───>│ Graphite/Influx/Timescale  │
//! └─────────┘    └───────────┘    └────────────────────────────┘
//!
//! ┌─────────┐    ┌───────────────┐    ┌──────────────────────┐
//! │ Sensors │───>│ HTTP /metrics │───>│ Prometheus (+gateway)│
//! └─────────┘    └───────────────┘    └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! hwexport --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExportConfig`] for configuration options.

pub mod config;
pub mod error;
pub mod exposition;
pub mod manager;
pub mod relay;
pub mod scheduler;
pub mod sensors;
pub mod server;
pub mod snapshot;
pub mod writer;

pub use config::{BackendConfig, ExportConfig, LogFormat, LoggingConfig};
pub use error::{Error, Result};
pub use manager::ExportManager;
pub use scheduler::Scheduler;
pub use sensors::SysinfoSource;
pub use server::MetricsServer;
pub use snapshot::{SensorKind, SensorReading, Snapshot, SnapshotSource};
pub use writer::{MetricWriter, WriteError};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Logging(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Logging(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
