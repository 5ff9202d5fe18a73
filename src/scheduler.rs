//! Periodic sample-and-export loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::snapshot::SnapshotSource;
use crate::writer::MetricWriter;

/// Drives one writer at a fixed interval.
///
/// Ticks run serially on this loop, so a slow write can never overlap
/// the next one. Missed ticks are delayed rather than bursted, which
/// keeps the effective period at or above the configured interval when
/// the backend is slow.
pub struct Scheduler {
    source: Arc<dyn SnapshotSource>,
    writer: Box<dyn MetricWriter>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        writer: Box<dyn MetricWriter>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            writer,
            interval,
        }
    }

    /// Run until the shutdown signal, then close the writer.
    ///
    /// The first tick fires immediately. A failed tick is logged and the
    /// loop keeps going; an in-flight write always completes before
    /// shutdown is honored.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            backend = self.writer.backend(),
            interval_secs = self.interval.as_secs(),
            "Starting export scheduler"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.collect_once().await {
                        warn!(
                            backend = self.writer.backend(),
                            error = %e,
                            "Export tick failed"
                        );
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.writer.close().await;
        info!(backend = self.writer.backend(), "Export scheduler stopped");
    }

    /// Sample the sensors once and hand the snapshot to the writer.
    async fn collect_once(&mut self) -> anyhow::Result<()> {
        let snapshot = self.source.sample().await?;
        debug!(readings = snapshot.readings.len(), "Sampled sensors");
        self.writer.write(&snapshot).await?;
        Ok(())
    }
}
