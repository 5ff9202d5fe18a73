//! TimescaleDB writer.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{debug, warn};

use crate::config::TimescaleConfig;
use crate::snapshot::Snapshot;
use crate::writer::{MetricWriter, WriteError};

const SETUP_SQL: &str = "\
CREATE EXTENSION IF NOT EXISTS timescaledb CASCADE;
CREATE TABLE IF NOT EXISTS hwexport_sensors (
    time TIMESTAMPTZ NOT NULL,
    host TEXT NOT NULL,
    id TEXT NOT NULL,
    hardware TEXT NOT NULL,
    sensor TEXT NOT NULL,
    kind TEXT NOT NULL,
    value DOUBLE PRECISION NOT NULL
);
SELECT create_hypertable('hwexport_sensors', 'time', if_not_exists => TRUE);
CREATE INDEX IF NOT EXISTS hwexport_sensors_host_id_time_idx
    ON hwexport_sensors (host, id, time DESC);
";

const INSERT_SQL: &str = "\
INSERT INTO hwexport_sensors (time, host, id, hardware, sensor, kind, value)
SELECT * FROM UNNEST(
    $1::timestamptz[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], $7::float8[]
)";

/// Writes snapshots into a TimescaleDB hypertable.
///
/// Connects lazily, keeps a prepared bulk insert across ticks, and
/// drops the client after a failed write so the next tick reconnects.
pub struct TimescaleWriter {
    config: TimescaleConfig,
    hostname: String,
    conn: Option<(Client, Statement)>,
}

impl TimescaleWriter {
    pub fn new(config: TimescaleConfig, hostname: String) -> Self {
        Self {
            config,
            hostname,
            conn: None,
        }
    }

    async fn connect(&self) -> Result<(Client, Statement), WriteError> {
        let (client, connection) =
            tokio_postgres::connect(&self.config.connection, NoTls).await?;

        // The connection future drives the socket until the client drops
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "Timescale connection closed");
            }
        });

        if self.config.setup_table {
            client.batch_execute(SETUP_SQL).await?;
        }

        let statement = client.prepare(INSERT_SQL).await?;

        debug!("Connected to timescale");
        Ok((client, statement))
    }
}

#[async_trait]
impl MetricWriter for TimescaleWriter {
    fn backend(&self) -> &'static str {
        "timescale"
    }

    async fn write(&mut self, snapshot: &Snapshot) -> Result<(), WriteError> {
        if snapshot.readings.is_empty() {
            return Ok(());
        }

        let (client, statement) = match self.conn.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        let time = to_system_time(snapshot.timestamp);
        let count = snapshot.readings.len();
        let mut times = Vec::with_capacity(count);
        let mut hosts = Vec::with_capacity(count);
        let mut ids = Vec::with_capacity(count);
        let mut hardwares = Vec::with_capacity(count);
        let mut sensors = Vec::with_capacity(count);
        let mut kinds = Vec::with_capacity(count);
        let mut values = Vec::with_capacity(count);

        for reading in &snapshot.readings {
            times.push(time);
            hosts.push(self.hostname.as_str());
            ids.push(reading.identifier.as_str());
            hardwares.push(reading.hardware.as_str());
            sensors.push(reading.sensor.as_str());
            kinds.push(reading.kind.as_str());
            values.push(reading.value);
        }

        let result = client
            .execute(
                &statement,
                &[&times, &hosts, &ids, &hardwares, &sensors, &kinds, &values],
            )
            .await;

        match result {
            Ok(_) => {
                self.conn = Some((client, statement));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&mut self) {
        self.conn = None;
    }
}

/// Convert epoch milliseconds to a [`SystemTime`] for the timestamptz bind.
fn to_system_time(timestamp_ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(timestamp_ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_system_time() {
        let time = to_system_time(1_700_000_000_123);
        let elapsed = time.duration_since(UNIX_EPOCH).unwrap();
        assert_eq!(elapsed, Duration::from_millis(1_700_000_000_123));
    }

    #[test]
    fn test_to_system_time_clamps_negative() {
        assert_eq!(to_system_time(-1), UNIX_EPOCH);
    }

    #[test]
    fn test_insert_matches_table_columns() {
        for column in ["time", "host", "id", "hardware", "sensor", "kind", "value"] {
            assert!(SETUP_SQL.contains(column));
            assert!(INSERT_SQL.contains(column));
        }
        assert_eq!(INSERT_SQL.matches("[]").count(), 7);
    }
}
