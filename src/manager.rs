//! Pipeline construction and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{BackendConfig, ConfigError, ExportConfig};
use crate::error::Error;
use crate::relay::PushRelay;
use crate::scheduler::Scheduler;
use crate::server::MetricsServer;
use crate::snapshot::SnapshotSource;
use crate::writer::{GraphiteWriter, Influx2Writer, InfluxWriter, MetricWriter, TimescaleWriter};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the tasks of a running export pipeline.
///
/// Exactly one backend runs at a time: push backends get a scheduler
/// task, the prometheus backend gets an HTTP server task plus an
/// optional pushgateway relay.
pub struct ExportManager {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    listen_addr: Option<SocketAddr>,
}

impl ExportManager {
    /// Start the pipeline described by the configuration.
    ///
    /// Binding the scrape listener happens here, so a taken port fails
    /// startup instead of surfacing later inside a task.
    pub async fn start(
        config: &ExportConfig,
        source: Arc<dyn SnapshotSource>,
    ) -> crate::error::Result<Self> {
        let backend = config.backend()?;
        let hostname = config.get_hostname();
        let interval = config.interval();

        info!(
            backend = backend.name(),
            host = %hostname,
            interval_secs = interval.as_secs(),
            "Starting export pipeline"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut listen_addr = None;

        match backend {
            BackendConfig::Graphite(graphite) => {
                let writer = GraphiteWriter::new(graphite, hostname);
                tasks.push(spawn_scheduler(
                    source,
                    Box::new(writer),
                    interval,
                    shutdown_rx.clone(),
                ));
            }
            BackendConfig::Prometheus(prometheus) => {
                let addr: SocketAddr = prometheus.listen.parse().map_err(|e| {
                    Error::Config(ConfigError::Validation(format!(
                        "Invalid listen address: {}",
                        e
                    )))
                })?;
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| Error::Bind { addr, source })?;
                let bound = listener.local_addr()?;
                listen_addr = Some(bound);

                let server = MetricsServer::new(source, hostname.clone());
                let server_shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = server.run(listener, server_shutdown).await {
                        error!(error = %e, "HTTP server error");
                    }
                }));

                if let Some(gateway_url) = &prometheus.pushgateway_url {
                    let relay = PushRelay::new(
                        http_client()?,
                        bound.port(),
                        gateway_url,
                        &prometheus.job,
                        &hostname,
                        interval,
                    );
                    tasks.push(tokio::spawn(relay.run(shutdown_rx.clone())));
                }
            }
            BackendConfig::Timescale(timescale) => {
                let writer = TimescaleWriter::new(timescale, hostname);
                tasks.push(spawn_scheduler(
                    source,
                    Box::new(writer),
                    interval,
                    shutdown_rx.clone(),
                ));
            }
            BackendConfig::Influx(influx) => {
                let writer = InfluxWriter::new(influx, hostname, http_client()?);
                tasks.push(spawn_scheduler(
                    source,
                    Box::new(writer),
                    interval,
                    shutdown_rx.clone(),
                ));
            }
            BackendConfig::Influx2(influx2) => {
                let writer = Influx2Writer::new(influx2, hostname, http_client()?);
                tasks.push(spawn_scheduler(
                    source,
                    Box::new(writer),
                    interval,
                    shutdown_rx.clone(),
                ));
            }
        }

        Ok(Self {
            shutdown_tx,
            tasks,
            listen_addr,
        })
    }

    /// Number of running pipeline tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Bound scrape address, present only for the prometheus backend.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    /// Signal shutdown and wait for tasks to drain.
    ///
    /// Tasks still running after the grace period are aborted.
    pub async fn shutdown(self) {
        info!("Shutting down export pipeline");
        self.shutdown_tx.send(true).ok();

        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        for mut task in self.tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!("Task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

fn spawn_scheduler(
    source: Arc<dyn SnapshotSource>,
    writer: Box<dyn MetricWriter>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let scheduler = Scheduler::new(source, writer, interval);
    tokio::spawn(scheduler.run(shutdown))
}

/// Shared HTTP client for the influx writers and the relay.
fn http_client() -> crate::error::Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(Error::Http)
}
