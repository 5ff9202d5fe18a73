//! Core data model for hardware sensor snapshots.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from snapshot acquisition.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Sensor source unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The kind of quantity a sensor measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensorKind {
    Temperature,
    Load,
    Clock,
    Fan,
    Voltage,
    Power,
    Data,
    Throughput,
}

impl SensorKind {
    /// Get the string representation used in identifiers and measurements.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Load => "load",
            SensorKind::Clock => "clock",
            SensorKind::Fan => "fan",
            SensorKind::Voltage => "voltage",
            SensorKind::Power => "power",
            SensorKind::Data => "data",
            SensorKind::Throughput => "throughput",
        }
    }

    /// The unit readings of this kind are reported in.
    pub fn base_unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "celsius",
            SensorKind::Load => "percent",
            SensorKind::Clock => "megahertz",
            SensorKind::Fan => "rpm",
            SensorKind::Voltage => "volts",
            SensorKind::Power => "watts",
            SensorKind::Data => "bytes",
            SensorKind::Throughput => "bytes_per_second",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One measured value from one hardware sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Stable identifier path, e.g. "/cpu/0/load/1".
    /// Unique within a snapshot; used as the series key by every backend.
    pub identifier: String,

    /// Hardware device name, e.g. "Intel(R) Core(TM) i7-9700K".
    pub hardware: String,

    /// Sensor name within the device, e.g. "Core #1".
    pub sensor: String,

    /// What the value measures.
    pub kind: SensorKind,

    /// The measured value in the kind's base unit.
    pub value: f64,
}

impl SensorReading {
    /// Create a new sensor reading.
    pub fn new(
        identifier: impl Into<String>,
        hardware: impl Into<String>,
        sensor: impl Into<String>,
        kind: SensorKind,
        value: f64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            hardware: hardware.into(),
            sensor: sensor.into(),
            kind,
            value,
        }
    }
}

/// A point-in-time batch of sensor readings.
///
/// Created fresh for every tick or scrape, consumed once, then dropped.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Unix epoch milliseconds when the readings were taken.
    pub timestamp: i64,

    /// The readings, in source order.
    pub readings: Vec<SensorReading>,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            readings,
        }
    }

    /// Create a snapshot with an explicit timestamp.
    pub fn with_timestamp(timestamp: i64, readings: Vec<SensorReading>) -> Self {
        Self {
            timestamp,
            readings,
        }
    }

    /// Capture time as whole Unix epoch seconds.
    pub fn epoch_seconds(&self) -> i64 {
        self.timestamp / 1000
    }
}

/// A source of sensor snapshots.
///
/// Sampling is read-only from the caller's perspective and may be invoked
/// concurrently; implementations guard any refresh state internally.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Acquire a fresh snapshot of all sensors.
    async fn sample(&self) -> Result<Snapshot, SnapshotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_kind_strings() {
        assert_eq!(SensorKind::Temperature.as_str(), "temperature");
        assert_eq!(SensorKind::Load.as_str(), "load");
        assert_eq!(SensorKind::Throughput.as_str(), "throughput");
    }

    #[test]
    fn test_sensor_kind_units() {
        assert_eq!(SensorKind::Temperature.base_unit(), "celsius");
        assert_eq!(SensorKind::Load.base_unit(), "percent");
        assert_eq!(SensorKind::Clock.base_unit(), "megahertz");
        assert_eq!(SensorKind::Data.base_unit(), "bytes");
    }

    #[test]
    fn test_reading_creation() {
        let reading = SensorReading::new("/cpu/0/load/1", "CPU", "Core #1", SensorKind::Load, 42.5);

        assert_eq!(reading.identifier, "/cpu/0/load/1");
        assert_eq!(reading.hardware, "CPU");
        assert_eq!(reading.sensor, "Core #1");
        assert_eq!(reading.kind, SensorKind::Load);
        assert_eq!(reading.value, 42.5);
    }

    #[test]
    fn test_snapshot_epoch_seconds() {
        let snapshot = Snapshot::with_timestamp(1_700_000_000_123, Vec::new());
        assert_eq!(snapshot.epoch_seconds(), 1_700_000_000);
    }

    #[test]
    fn test_snapshot_stamped_with_current_time() {
        let before = chrono::Utc::now().timestamp_millis();
        let snapshot = Snapshot::new(Vec::new());
        let after = chrono::Utc::now().timestamp_millis();

        assert!(snapshot.timestamp >= before);
        assert!(snapshot.timestamp <= after);
    }
}
