use std::future::ready;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub async fn index() -> &'static str {
    "kafka resume consumer"
}

pub fn router(recorder_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(|| ready("ok")))
        .route(
            "/metrics",
            get(move || ready(recorder_handle.render())),
        )
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    const BUCKETS: &[f64] = &[
        1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .context("Invalid histogram buckets")?
        .install_recorder()
        .context("Failed to install metrics recorder")
}

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    axum::serve(listener, router)
        .await
        .context("Metrics server failed")?;

    Ok(())
}
