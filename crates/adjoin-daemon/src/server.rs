use crate::features::observability::controller::ObservabilityController;
use crate::shared::error::{DaemonError, DaemonResult};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn router(controller: Arc<ObservabilityController>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(controller)
}

/// Serve `/metrics` and `/healthz` until the process exits.
pub async fn serve(addr: SocketAddr, controller: Arc<ObservabilityController>) -> DaemonResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| DaemonError::Metrics(format!("failed to bind {addr}: {e}")))?;
    info!(%addr, "Serving metrics");

    axum::serve(listener, router(controller))
        .await
        .map_err(|e| DaemonError::Metrics(format!("metrics server failed: {e}")))
}

async fn metrics(State(controller): State<Arc<ObservabilityController>>) -> Response {
    match controller.render_metrics() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}
