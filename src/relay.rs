//! Pushgateway relay for the scrape endpoint.

use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::server::EXPOSITION_CONTENT_TYPE;

/// Periodically scrapes the local endpoint and pushes the body to a
/// Prometheus pushgateway.
///
/// Pushes are fire-and-forget: a failed attempt is logged and the next
/// one waits a full interval, so an unreachable gateway never backs up
/// the exporter.
pub struct PushRelay {
    client: Client,
    scrape_url: String,
    push_url: String,
    interval: Duration,
}

impl PushRelay {
    pub fn new(
        client: Client,
        local_port: u16,
        gateway_url: &str,
        job: &str,
        instance: &str,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            scrape_url: format!("http://127.0.0.1:{}/metrics", local_port),
            push_url: build_push_url(gateway_url, job, instance),
            interval,
        }
    }

    /// Run until the shutdown signal. The first push happens one
    /// interval after startup.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            push_url = %self.push_url,
            interval_secs = self.interval.as_secs(),
            "Starting pushgateway relay"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.relay_once().await {
                        warn!(error = %e, "Pushgateway relay failed");
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Pushgateway relay stopped");
    }

    /// Scrape the local endpoint and push the body to the gateway.
    async fn relay_once(&self) -> anyhow::Result<()> {
        let body = self
            .client
            .get(&self.scrape_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        self.client
            .post(&self.push_url)
            .header("content-type", EXPOSITION_CONTENT_TYPE)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Build the grouped push URL: `{gateway}/metrics/job/{job}/instance/{instance}`.
pub(crate) fn build_push_url(gateway: &str, job: &str, instance: &str) -> String {
    format!(
        "{}/metrics/job/{}/instance/{}",
        gateway.trim_end_matches('/'),
        job,
        instance
    )
}
