//! Integration tests for the export pipeline.
//!
//! These tests drive the public API end to end: configuration parsing,
//! backend selection, the export scheduler, the scrape endpoint, and
//! the pushgateway relay, against real local sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use hwexport::relay::PushRelay;
use hwexport::snapshot::SnapshotError;
use hwexport::{
    ExportConfig, ExportManager, MetricWriter, Scheduler, SensorKind, SensorReading, Snapshot,
    SnapshotSource, WriteError,
};

/// Source with two fixed readings in different hardware groups.
struct StaticSource;

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn sample(&self) -> Result<Snapshot, SnapshotError> {
        Ok(Snapshot::new(vec![
            SensorReading::new("/cpu/0/load/0", "AMD Ryzen", "CPU Total", SensorKind::Load, 42.5),
            SensorReading::new(
                "/thermal/0/temperature/0",
                "coretemp Package id 0",
                "Temperature",
                SensorKind::Temperature,
                61.25,
            ),
        ]))
    }
}

/// Source that counts samples and takes a little while, so overlapping
/// scrapes are observable.
struct CountingSource {
    samples: AtomicUsize,
}

#[async_trait]
impl SnapshotSource for CountingSource {
    async fn sample(&self) -> Result<Snapshot, SnapshotError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let n = self.samples.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Snapshot::new(vec![SensorReading::new(
            "/cpu/0/load/0",
            "CPU",
            "CPU Total",
            SensorKind::Load,
            n as f64,
        )]))
    }
}

struct FailingWriter {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl MetricWriter for FailingWriter {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn write(&mut self, _snapshot: &Snapshot) -> Result<(), WriteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(WriteError::Connect("connection refused".to_string()))
    }

    async fn close(&mut self) {}
}

struct SlowFirstWriter {
    entries: Arc<Mutex<Vec<tokio::time::Instant>>>,
    first_delay: Duration,
    calls: usize,
}

#[async_trait]
impl MetricWriter for SlowFirstWriter {
    fn backend(&self) -> &'static str {
        "slow"
    }

    async fn write(&mut self, _snapshot: &Snapshot) -> Result<(), WriteError> {
        self.entries.lock().push(tokio::time::Instant::now());
        if self.calls == 0 {
            tokio::time::sleep(self.first_delay).await;
        }
        self.calls += 1;
        Ok(())
    }

    async fn close(&mut self) {}
}

#[test]
fn test_config_rejects_ambiguous_backends() {
    let result = ExportConfig::parse(
        r#"{
            graphite: { host: "graphite.local" },
            timescale: { connection: "host=localhost" }
        }"#,
    );

    let message = result.unwrap_err().to_string();
    assert!(message.contains("graphite"), "Got: {}", message);
    assert!(message.contains("timescale"), "Got: {}", message);
}

#[test]
fn test_config_rejects_zero_backends() {
    let result = ExportConfig::parse(r#"{ interval_secs: 5 }"#);
    assert!(result.unwrap_err().to_string().contains("No backend"));
}

#[tokio::test]
async fn test_one_backend_means_one_pipeline() {
    let graphite = ExportConfig::parse(
        r#"{ interval_secs: 60, graphite: { host: "127.0.0.1", port: 1 } }"#,
    )
    .unwrap();
    let manager = ExportManager::start(&graphite, Arc::new(StaticSource))
        .await
        .unwrap();
    assert_eq!(manager.task_count(), 1);
    manager.shutdown().await;

    let prometheus =
        ExportConfig::parse(r#"{ prometheus: { listen: "127.0.0.1:0" } }"#).unwrap();
    let manager = ExportManager::start(&prometheus, Arc::new(StaticSource))
        .await
        .unwrap();
    assert_eq!(manager.task_count(), 1);
    manager.shutdown().await;

    let with_gateway = ExportConfig::parse(
        r#"{
            interval_secs: 60,
            prometheus: {
                listen: "127.0.0.1:0",
                pushgateway_url: "http://127.0.0.1:1"
            }
        }"#,
    )
    .unwrap();
    let manager = ExportManager::start(&with_gateway, Arc::new(StaticSource))
        .await
        .unwrap();
    assert_eq!(manager.task_count(), 2);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_keeps_going_after_write_failures() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let writer = FailingWriter {
        attempts: attempts.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(
        Arc::new(StaticSource),
        Box::new(writer),
        Duration::from_secs(1),
    );
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(3500)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(
        attempts.load(Ordering::SeqCst) >= 3,
        "Scheduler should keep ticking through failures"
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_never_shortens_the_period() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    let writer = SlowFirstWriter {
        entries: entries.clone(),
        first_delay: Duration::from_millis(250),
        calls: 0,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(
        Arc::new(StaticSource),
        Box::new(writer),
        Duration::from_millis(100),
    );
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(1020)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let entries = entries.lock();
    assert!(entries.len() >= 5);
    for pair in entries.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(100),
            "Writes came closer together than the interval"
        );
    }
}

#[tokio::test]
async fn test_concurrent_scrapes_each_get_a_fresh_sample() {
    let source = Arc::new(CountingSource {
        samples: AtomicUsize::new(0),
    });

    let config = ExportConfig::parse(
        r#"{ hostname: "box1", prometheus: { listen: "127.0.0.1:0" } }"#,
    )
    .unwrap();
    let manager = ExportManager::start(&config, source.clone()).await.unwrap();
    let addr = manager.listen_addr().unwrap();

    let client = reqwest::Client::new();
    let url = format!("http://{}/metrics", addr);
    let (first, second) = tokio::join!(
        client.get(&url).send(),
        client.get(&url).send()
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert!(first.status().is_success());
    assert!(second.status().is_success());

    let body1 = first.text().await.unwrap();
    let body2 = second.text().await.unwrap();
    assert_eq!(source.samples.load(Ordering::SeqCst), 2);
    assert_ne!(body1, body2, "Each scrape should see its own sample");

    manager.shutdown().await;
}

#[tokio::test]
async fn test_graphite_end_to_end() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let sink = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut lines = String::new();
        reader.read_line(&mut lines).await.unwrap();
        reader.read_line(&mut lines).await.unwrap();
        lines
    });

    let config = ExportConfig::parse(&format!(
        r#"{{
            hostname: "box1",
            interval_secs: 1,
            graphite: {{ host: "127.0.0.1", port: {} }}
        }}"#,
        port
    ))
    .unwrap();
    let manager = ExportManager::start(&config, Arc::new(StaticSource))
        .await
        .unwrap();

    // The first tick fires immediately, so both lines arrive well before
    // the first interval elapses
    let lines = tokio::time::timeout(Duration::from_secs(3), sink)
        .await
        .unwrap()
        .unwrap();
    assert!(
        lines.starts_with("hw.box1.cpu.0.load.0 42.5 "),
        "Got: {}",
        lines
    );
    assert!(
        lines.contains("hw.box1.thermal.0.temperature.0 61.25 "),
        "Got: {}",
        lines
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn test_prometheus_end_to_end() {
    let config = ExportConfig::parse(
        r#"{ hostname: "box1", prometheus: { listen: "127.0.0.1:0" } }"#,
    )
    .unwrap();
    let manager = ExportManager::start(&config, Arc::new(StaticSource))
        .await
        .unwrap();
    // Without a pushgateway URL there is no relay task
    assert_eq!(manager.task_count(), 1);
    let addr = manager.listen_addr().unwrap();

    let response = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap();
    assert!(response.status().is_success());

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("version=0.0.4"));

    let body = response.text().await.unwrap();
    assert!(body.contains("# TYPE hw_cpu_percent gauge"), "Got: {}", body);
    assert!(
        body.contains("# TYPE hw_thermal_celsius gauge"),
        "Got: {}",
        body
    );
    assert!(body.contains("host=\"box1\""));

    manager.shutdown().await;
}

type PushCaptured = Arc<Mutex<Option<(String, String)>>>;

async fn recording_gateway(
    State(captured): State<PushCaptured>,
    uri: Uri,
    body: String,
) -> StatusCode {
    *captured.lock() = Some((uri.path().to_string(), body));
    StatusCode::ACCEPTED
}

#[tokio::test]
async fn test_pushgateway_relay_end_to_end() {
    let captured: PushCaptured = Arc::new(Mutex::new(None));
    let gateway = Router::new()
        .fallback(recording_gateway)
        .with_state(captured.clone());
    let gateway_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway_addr = gateway_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(gateway_listener, gateway).await.unwrap();
    });

    let config = ExportConfig::parse(&format!(
        r#"{{
            hostname: "box1",
            interval_secs: 1,
            prometheus: {{
                listen: "127.0.0.1:0",
                pushgateway_url: "http://{}",
                job: "bench"
            }}
        }}"#,
        gateway_addr
    ))
    .unwrap();
    let manager = ExportManager::start(&config, Arc::new(StaticSource))
        .await
        .unwrap();
    assert_eq!(manager.task_count(), 2);

    // First push lands one interval after startup
    let mut pushed = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Some(capture) = captured.lock().take() {
            pushed = Some(capture);
            break;
        }
    }

    let (path, body) = pushed.expect("gateway never received a push");
    assert_eq!(path, "/metrics/job/bench/instance/box1");
    assert!(body.contains("hw_cpu_percent"), "Got: {}", body);

    // The pushed body matches what a direct scrape returns: the source is
    // fixed and the exposition text carries no timestamps
    let addr = manager.listen_addr().unwrap();
    let scraped = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, scraped);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_relay_keeps_full_cadence_after_failures() {
    // A scrape endpoint that works and a gateway that always rejects
    let scrape_app = Router::new().route(
        "/metrics",
        get(|| async { "# TYPE hw_cpu_percent gauge\nhw_cpu_percent 1\n" }),
    );
    let scrape_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let scrape_port = scrape_listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(scrape_listener, scrape_app).await.unwrap();
    });

    let attempts: Arc<Mutex<Vec<std::time::Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let gateway_attempts = attempts.clone();
    let gateway = Router::new().fallback(move || {
        let attempts = gateway_attempts.clone();
        async move {
            attempts.lock().push(std::time::Instant::now());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    });
    let gateway_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway_addr = gateway_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(gateway_listener, gateway).await.unwrap();
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = PushRelay::new(
        reqwest::Client::new(),
        scrape_port,
        &format!("http://{}", gateway_addr),
        "bench",
        "box1",
        Duration::from_millis(200),
    );
    let handle = tokio::spawn(relay.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let attempts = attempts.lock();
    assert!(
        (3..=6).contains(&attempts.len()),
        "Expected steady retries, got {}",
        attempts.len()
    );
    for pair in attempts.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(150),
            "Retries should wait a full interval"
        );
    }
}
