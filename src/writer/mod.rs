//! Metric delivery backends.

pub mod graphite;
pub mod influx;
pub mod influx2;
pub mod timescale;

pub use graphite::GraphiteWriter;
pub use influx::InfluxWriter;
pub use influx2::Influx2Writer;
pub use timescale::TimescaleWriter;

use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::Snapshot;

/// Error type for write operations.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server rejected write: status {status}")]
    Rejected { status: u16 },
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
}

/// A sink that delivers snapshots to one backend.
///
/// Writers hold whatever connection state they need across ticks and
/// reconnect lazily after a failed write.
#[async_trait]
pub trait MetricWriter: Send {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Deliver one snapshot.
    async fn write(&mut self, snapshot: &Snapshot) -> Result<(), WriteError>;

    /// Flush and tear down any open connection.
    async fn close(&mut self);
}
