//! HTTP server for the Prometheus scrape endpoint.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::exposition;
use crate::snapshot::SnapshotSource;

/// Content type for the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    source: Arc<dyn SnapshotSource>,
    hostname: String,
}

/// Create the HTTP router.
fn create_router(source: Arc<dyn SnapshotSource>, hostname: String) -> Router {
    let state = AppState { source, hostname };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the /metrics endpoint.
///
/// Every scrape takes a fresh sensor sample, so concurrent scrapes each
/// get their own snapshot.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.source.sample().await {
        Ok(snapshot) => {
            let body = exposition::render(&snapshot, &state.hostname);
            (
                StatusCode::OK,
                [("content-type", EXPOSITION_CONTENT_TYPE)],
                body,
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Sensor sampling failed during scrape");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("sampling failed: {}\n", e),
            )
                .into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Scrape endpoint server.
pub struct MetricsServer {
    source: Arc<dyn SnapshotSource>,
    hostname: String,
}

impl MetricsServer {
    /// Create a new server.
    pub fn new(source: Arc<dyn SnapshotSource>, hostname: String) -> Self {
        Self { source, hostname }
    }

    /// Run on an already bound listener until the shutdown signal.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let router = create_router(self.source, self.hostname);

        info!(addr = %listener.local_addr()?, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
