//! InfluxDB 2.x line protocol writer.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::Influx2Config;
use crate::snapshot::Snapshot;
use crate::writer::influx::encode_lines;
use crate::writer::{MetricWriter, WriteError};

/// Writes snapshots to InfluxDB 2.x over the `/api/v2/write` endpoint.
///
/// Shares the line protocol encoding with the 1.x writer; only the
/// endpoint and auth differ.
pub struct Influx2Writer {
    config: Influx2Config,
    hostname: String,
    client: Client,
}

impl Influx2Writer {
    pub fn new(config: Influx2Config, hostname: String, client: Client) -> Self {
        Self {
            config,
            hostname,
            client,
        }
    }
}

#[async_trait]
impl MetricWriter for Influx2Writer {
    fn backend(&self) -> &'static str {
        "influx2"
    }

    async fn write(&mut self, snapshot: &Snapshot) -> Result<(), WriteError> {
        let body = encode_lines(snapshot, &self.hostname);
        if body.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/v2/write", self.config.address.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header("Authorization", format!("Token {}", self.config.token))
            .body(body)
            .send()
            .await?;

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
