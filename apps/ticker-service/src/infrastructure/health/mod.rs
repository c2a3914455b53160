//! Probe Endpoints
//!
//! A small axum app beside the WebSocket listener.
//!
//! | Route      | Answers                                          |
//! |------------|--------------------------------------------------|
//! | `/health`  | JSON snapshot of simulator and session counts    |
//! | `/healthz` | 200 while the process is up                      |
//! | `/readyz`  | 200 once the simulator loop is ticking           |
//! | `/metrics` | Prometheus exposition                            |

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{MarketSimulator, StockService};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::websocket::SessionServer;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Rolled-up verdict.
    pub status: HealthStatus,
    /// Crate version.
    pub version: String,
    /// Seconds since the probe server was built.
    pub uptime_secs: u64,
    /// Wall clock at the time of the probe.
    pub current_time: DateTime<Utc>,
    /// Market simulator.
    pub simulator: SimulatorStatus,
    /// Connected and logged-in callers.
    pub sessions: SessionStatus,
}

/// Rolled-up verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ticking a non-empty catalog.
    Healthy,
    /// Ticking, but there is nothing to price.
    Degraded,
    /// Simulator loop not running.
    Unhealthy,
}

impl HealthStatus {
    const fn of(simulator: &SimulatorStatus) -> Self {
        if !simulator.running {
            Self::Unhealthy
        } else if simulator.instruments == 0 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    const fn http_status(self) -> StatusCode {
        match self {
            Self::Healthy | Self::Degraded => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Market simulator section of the report.
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorStatus {
    /// Tick loop is running.
    pub running: bool,
    /// Completed ticks.
    pub ticks: u64,
    /// Instruments in the catalog.
    pub instruments: usize,
}

/// Session section of the report.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Open sockets, logged in or not.
    pub connections: usize,
    /// Logged-in sessions.
    pub registered: usize,
    /// Registered sessions with monitoring on.
    pub active: usize,
}

/// Handles the probes read from.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    service: Arc<StockService>,
    simulator: Arc<MarketSimulator>,
    sessions: Arc<SessionServer>,
}

impl HealthServerState {
    /// Probe state over the shared service, simulator and session server.
    /// Uptime counts from this call.
    #[must_use]
    pub fn new(
        version: String,
        service: Arc<StockService>,
        simulator: Arc<MarketSimulator>,
        sessions: Arc<SessionServer>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            service,
            simulator,
            sessions,
        }
    }

    fn snapshot(&self) -> HealthResponse {
        let simulator = SimulatorStatus {
            running: self.simulator.is_running(),
            ticks: self.simulator.ticks(),
            instruments: self.service.catalog().len(),
        };
        let registry = self.service.registry().stats();

        HealthResponse {
            status: HealthStatus::of(&simulator),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            simulator,
            sessions: SessionStatus {
                connections: self.sessions.connections(),
                registered: registry.sessions,
                active: registry.active,
            },
        }
    }
}

/// Serves the probe routes on `0.0.0.0:<port>` until cancelled.
pub struct HealthServer {
    addr: SocketAddr,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Server for `0.0.0.0:<port>` that stops when `cancel` fires.
    #[must_use]
    pub fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            state,
            cancel,
        }
    }

    /// Probe routes bound to `state`.
    #[must_use]
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(report))
            .route("/healthz", get(|| async { "OK" }))
            .route("/readyz", get(ready))
            .route("/metrics", get(scrape))
            .with_state(state)
    }

    /// Serve until the cancellation token fires.
    ///
    /// # Errors
    ///
    /// [`HealthServerError::BindFailed`] if the port is taken, or
    /// [`HealthServerError::ServerFailed`] if axum stops with an error.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.addr.port(), e.to_string()))?;
        tracing::info!(addr = %self.addr, "Probe endpoints listening");

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))
    }
}

async fn report(State(state): State<Arc<HealthServerState>>) -> Response {
    let body = state.snapshot();
    (body.status.http_status(), Json(body)).into_response()
}

async fn ready(State(state): State<Arc<HealthServerState>>) -> Response {
    if state.simulator.is_running() {
        "READY".into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY").into_response()
    }
}

async fn scrape() -> Response {
    let Some(handle) = get_metrics_handle() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response();
    };
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], handle.render()).into_response()
}

/// Probe server failures.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Listener could not bind.
    #[error("health port {0} unavailable: {1}")]
    BindFailed(u16, String),

    /// axum returned an error while serving.
    #[error("health server failed: {0}")]
    ServerFailed(String),
}
