//! Scrape endpoint for the scanner.
//!
//! Every request reads the scanner through its [`ScannerMonitor`], so the
//! exported values are as fresh as the scrape and nobody has to push
//! updates in between.

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::session::ScannerMonitor;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Errors from running the scrape endpoint.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying socket error.
        source: std::io::Error,
    },

    #[error("metrics server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Where the scrape endpoint listens.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind.
    pub bind_addr: SocketAddr,
}

impl MetricsServerConfig {
    /// Listens on every interface at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

/// Registry plus the scanner it reports on.
pub struct MetricsState {
    registry: MetricsRegistry,
    monitor: ScannerMonitor,
}

impl MetricsState {
    /// Binds a registry to a scanner.
    pub fn new(registry: MetricsRegistry, monitor: ScannerMonitor) -> Self {
        Self { registry, monitor }
    }

    /// Reads the scanner and folds the reading into the registry.
    pub fn refresh(&self) -> MetricsSnapshot {
        let snapshot = MetricsSnapshot::from_monitor(&self.monitor);
        self.registry.update(&snapshot);
        snapshot
    }
}

/// HTTP endpoint serving `/metrics` (Prometheus text) and `/status` (JSON).
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<MetricsState>,
}

impl MetricsServer {
    /// Creates a server reporting on `monitor`.
    pub fn new(
        config: MetricsServerConfig,
        registry: MetricsRegistry,
        monitor: ScannerMonitor,
    ) -> Self {
        Self {
            config,
            state: Arc::new(MetricsState::new(registry, monitor)),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/status", get(status_handler))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET]),
            )
            .with_state(Arc::clone(&self.state))
    }

    /// Serves until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.bind_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(%addr, "Metrics server listening");

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> Response {
    state.refresh();
    match state.registry.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn status_handler(State(state): State<Arc<MetricsState>>) -> Json<MetricsSnapshot> {
    Json(state.refresh())
}
