//! Graphite plaintext protocol writer.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::GraphiteConfig;
use crate::snapshot::{SensorReading, Snapshot};
use crate::writer::{MetricWriter, WriteError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes snapshots to a Graphite server over TCP.
///
/// The connection is opened on first use and dropped after a failed
/// write, so the next tick reconnects instead of sticking with a dead
/// socket.
pub struct GraphiteWriter {
    config: GraphiteConfig,
    hostname: String,
    stream: Option<TcpStream>,
}

impl GraphiteWriter {
    pub fn new(config: GraphiteConfig, hostname: String) -> Self {
        Self {
            config,
            hostname,
            stream: None,
        }
    }

    async fn connect(&self) -> Result<TcpStream, WriteError> {
        let addr = (self.config.host.as_str(), self.config.port);
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| WriteError::Connect("Connection timeout".to_string()))?
            .map_err(|e| WriteError::Connect(e.to_string()))?;

        debug!(
            host = %self.config.host,
            port = self.config.port,
            "Connected to graphite"
        );
        Ok(stream)
    }

    /// Encode a snapshot as plaintext protocol lines.
    fn encode(&self, snapshot: &Snapshot) -> String {
        let timestamp = snapshot.epoch_seconds();
        let mut output = String::with_capacity(snapshot.readings.len() * 64);

        for reading in &snapshot.readings {
            // Graphite stores doubles; NaN and infinity corrupt whisper files
            if !reading.value.is_finite() {
                continue;
            }

            if self.config.tags {
                self.push_tagged_line(&mut output, reading, timestamp);
            } else {
                self.push_plain_line(&mut output, reading, timestamp);
            }
        }

        output
    }

    /// Dotted-path form: `{prefix}.{host}.{identifier segments}`.
    fn push_plain_line(&self, output: &mut String, reading: &SensorReading, timestamp: i64) {
        let path = reading
            .identifier
            .trim_start_matches('/')
            .split('/')
            .map(sanitize_path_part)
            .collect::<Vec<_>>()
            .join(".");

        writeln!(
            output,
            "{}.{}.{} {} {}",
            self.config.prefix,
            sanitize_path_part(&self.hostname),
            path,
            reading.value,
            timestamp
        )
        .ok();
    }

    /// Tagged form: `{prefix}.{group}.{kind};host=..;hardware=..;sensor=..;id=..`.
    fn push_tagged_line(&self, output: &mut String, reading: &SensorReading, timestamp: i64) {
        let group = reading
            .identifier
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();

        writeln!(
            output,
            "{}.{}.{};host={};hardware={};sensor={};id={} {} {}",
            self.config.prefix,
            sanitize_path_part(group),
            reading.kind,
            sanitize_tag_value(&self.hostname),
            sanitize_tag_value(&reading.hardware),
            sanitize_tag_value(&reading.sensor),
            sanitize_tag_value(&reading.identifier),
            reading.value,
            timestamp
        )
        .ok();
    }
}

#[async_trait]
impl MetricWriter for GraphiteWriter {
    fn backend(&self) -> &'static str {
        "graphite"
    }

    async fn write(&mut self, snapshot: &Snapshot) -> Result<(), WriteError> {
        let payload = self.encode(snapshot);
        if payload.is_empty() {
            return Ok(());
        }

        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        // On failure the stream stays dropped and the next write reconnects
        stream.write_all(payload.as_bytes()).await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.ok();
        }
    }
}

/// Sanitize a dotted-path component.
fn sanitize_path_part(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            ' ' | ';' | '.' | '/' => '_',
            _ => c,
        })
        .collect()
}

/// Sanitize a graphite tag value.
fn sanitize_tag_value(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            ' ' | ';' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SensorKind;
    use tokio::io::AsyncReadExt;

    fn make_writer(tags: bool) -> GraphiteWriter {
        GraphiteWriter::new(
            GraphiteConfig {
                host: "localhost".to_string(),
                port: 2003,
                prefix: "hw".to_string(),
                tags,
            },
            "box1".to_string(),
        )
    }

    fn make_snapshot() -> Snapshot {
        Snapshot::with_timestamp(
            1_700_000_000_000,
            vec![SensorReading::new(
                "/cpu/0/load/0",
                "AMD Ryzen",
                "CPU Total",
                SensorKind::Load,
                42.5,
            )],
        )
    }

    #[test]
    fn test_encode_plain() {
        let writer = make_writer(false);
        let encoded = writer.encode(&make_snapshot());

        assert_eq!(encoded, "hw.box1.cpu.0.load.0 42.5 1700000000\n");
    }

    #[test]
    fn test_encode_tagged() {
        let writer = make_writer(true);
        let encoded = writer.encode(&make_snapshot());

        assert_eq!(
            encoded,
            "hw.cpu.load;host=box1;hardware=AMD_Ryzen;sensor=CPU_Total;id=/cpu/0/load/0 42.5 1700000000\n"
        );
    }

    #[test]
    fn test_encode_skips_non_finite() {
        let writer = make_writer(false);
        let snapshot = Snapshot::with_timestamp(
            1_700_000_000_000,
            vec![
                SensorReading::new("/gpu/0/fan/0", "GPU", "Fan", SensorKind::Fan, f64::NAN),
                SensorReading::new("/cpu/0/load/0", "CPU", "CPU Total", SensorKind::Load, 1.0),
            ],
        );

        let encoded = writer.encode(&snapshot);
        assert_eq!(encoded.lines().count(), 1);
        assert!(encoded.starts_with("hw.box1.cpu.0.load.0"));
    }

    #[test]
    fn test_encode_sanitizes_hostname() {
        let writer = GraphiteWriter::new(
            GraphiteConfig {
                host: "localhost".to_string(),
                port: 2003,
                prefix: "hw".to_string(),
                tags: false,
            },
            "node.lan".to_string(),
        );

        let encoded = writer.encode(&make_snapshot());
        assert!(encoded.starts_with("hw.node_lan.cpu.0.load.0"));
    }

    #[tokio::test]
    async fn test_write_delivers_lines() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            String::from_utf8(received).unwrap()
        });

        let mut writer = GraphiteWriter::new(
            GraphiteConfig {
                host: "127.0.0.1".to_string(),
                port,
                prefix: "hw".to_string(),
                tags: false,
            },
            "box1".to_string(),
        );

        writer.write(&make_snapshot()).await.unwrap();
        writer.close().await;

        let received = server.await.unwrap();
        assert_eq!(received, "hw.box1.cpu.0.load.0 42.5 1700000000\n");
    }

    #[tokio::test]
    async fn test_write_surfaces_connect_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut writer = GraphiteWriter::new(
            GraphiteConfig {
                host: "127.0.0.1".to_string(),
                port,
                prefix: "hw".to_string(),
                tags: false,
            },
            "box1".to_string(),
        );

        let result = writer.write(&make_snapshot()).await;
        assert!(matches!(result, Err(WriteError::Connect(_))));
    }
}
