//! InfluxDB 1.x line protocol writer.

use std::fmt::Write;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::InfluxConfig;
use crate::snapshot::Snapshot;
use crate::writer::{MetricWriter, WriteError};

/// Writes snapshots to InfluxDB 1.x over the `/write` endpoint.
pub struct InfluxWriter {
    config: InfluxConfig,
    hostname: String,
    client: Client,
}

impl InfluxWriter {
    pub fn new(config: InfluxConfig, hostname: String, client: Client) -> Self {
        Self {
            config,
            hostname,
            client,
        }
    }
}

#[async_trait]
impl MetricWriter for InfluxWriter {
    fn backend(&self) -> &'static str {
        "influx"
    }

    async fn write(&mut self, snapshot: &Snapshot) -> Result<(), WriteError> {
        let body = encode_lines(snapshot, &self.hostname);
        if body.is_empty() {
            return Ok(());
        }

        let url = format!("{}/write", self.config.address.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .query(&[("db", self.config.db.as_str()), ("precision", "ms")])
            .body(body);

        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    async fn close(&mut self) {}
}

/// Encode a snapshot as influx line protocol with millisecond timestamps.
///
/// One line per reading: the sensor kind is the measurement and the
/// series identity lives in tags. Non-finite values are dropped since
/// line protocol has no representation for them.
pub(crate) fn encode_lines(snapshot: &Snapshot, hostname: &str) -> String {
    let mut output = String::with_capacity(snapshot.readings.len() * 96);

    for reading in &snapshot.readings {
        if !reading.value.is_finite() {
            continue;
        }

        writeln!(
            output,
            "{},host={},hardware={},sensor={},id={} value={} {}",
            reading.kind,
            escape_tag(hostname),
            escape_tag(&reading.hardware),
            escape_tag(&reading.sensor),
            escape_tag(&reading.identifier),
            reading.value,
            snapshot.timestamp
        )
        .ok();
    }

    output
}

/// Escape a tag value per line protocol rules.
fn escape_tag(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ',' | '=' | ' ' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}
