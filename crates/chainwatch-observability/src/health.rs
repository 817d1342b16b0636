//! Health and metrics HTTP surface.
//!
//! `/healthz` runs every registered probe under a 3-second bound and
//! returns 200 with per-probe statuses, or 503 when any probe fails.
//! `/metrics` exposes the Prometheus registry when metrics are enabled.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use chainwatch_core::WatchError;

use crate::metrics::WatchMetrics;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A named health probe (ledger ping, RPC ping, ...).
#[async_trait]
pub trait Probe: Send + Sync {
    async fn ping(&self) -> Result<(), WatchError>;
}

/// Shared state behind the health router.
pub struct HealthState {
    pub probes: Vec<(String, Arc<dyn Probe>)>,
    pub metrics: Option<Arc<WatchMetrics>>,
}

/// Build the router for `/healthz` and `/metrics`.
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

/// Bind and serve until the task is dropped or the listener fails.
pub async fn serve(addr: SocketAddr, state: Arc<HealthState>) -> Result<(), WatchError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| WatchError::Config(format!("bind {addr}: {e}")))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| WatchError::Other(format!("health server: {e}")))
}

async fn healthz(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let (ok, statuses) = run_probes(&state.probes).await;
    let code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let mut body = serde_json::Map::new();
    body.insert(
        "status".into(),
        serde_json::Value::from(if ok { "ok" } else { "fail" }),
    );
    for (name, probe_ok) in statuses {
        body.insert(
            name,
            serde_json::Value::from(if probe_ok { "ok" } else { "fail" }),
        );
    }
    (code, Json(serde_json::Value::Object(body)))
}

async fn metrics_endpoint(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(metrics) => (StatusCode::OK, metrics.encode()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

/// Run every probe with the standard bound; a timeout counts as a failure.
async fn run_probes(probes: &[(String, Arc<dyn Probe>)]) -> (bool, Vec<(String, bool)>) {
    let mut all_ok = true;
    let mut statuses = Vec::with_capacity(probes.len());
    for (name, probe) in probes {
        let ok = matches!(
            tokio::time::timeout(PROBE_TIMEOUT, probe.ping()).await,
            Ok(Ok(()))
        );
        all_ok &= ok;
        statuses.push((name.clone(), ok));
    }
    (all_ok, statuses)
}
