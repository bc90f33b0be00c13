//! HTTP server for the Prometheus metrics endpoint.

use axum::{routing::get, Router};
use std::net::SocketAddr;

/// Default metrics listen address.
pub const METRICS_ADDR: &str = "0.0.0.0:9314";

async fn metrics_handler() -> String {
    crate::metrics::gather()
}

/// Serve `/metrics` (and `/`) forever. Spawned as a background task;
/// a bind failure is logged, not fatal.
pub async fn run_metrics_server(addr: &str) {
    let app = Router::new()
        .route("/", get(metrics_handler))
        .route("/metrics", get(metrics_handler));

    let addr: SocketAddr = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(%addr, error = %e, "bad metrics address");
            return;
        }
    };

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind metrics endpoint");
            return;
        }
    };
    tracing::info!(%addr, "metrics endpoint listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "metrics server error");
    }
}
