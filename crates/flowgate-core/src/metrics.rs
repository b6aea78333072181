//! Prometheus metrics helpers for the Flowgate system.
//!
//! Centralized recorder initialization and the metric descriptions used by
//! the ingestion pipeline. Metric values are always counts, rates, or sizes;
//! no label may carry row content or identifiers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use flowgate_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("ingest_batches_total").increment(1);
//! }
//! ```

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if called more than once.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_ingest_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already
/// installed. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the `/metrics` HTTP server on the given port.
///
/// Spawns a background task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    Ok(())
}

/// Register descriptions for the ingestion metrics.
fn register_ingest_metrics() {
    describe_counter!(
        "ingest_batches_total",
        "Batches committed through the storage port"
    );
    describe_counter!(
        "ingest_batches_rejected_total",
        "Batches rejected before persistence (label: reason)"
    );
    describe_counter!(
        "ingest_batches_duplicate_total",
        "Batches refused as duplicates by the storage port"
    );
    describe_counter!("ingest_rows_accepted_total", "Rows accepted across batches");
    describe_counter!(
        "ingest_rows_rejected_total",
        "Rows rejected across batches (all buckets)"
    );
    describe_counter!(
        "ingest_rows_unknown_cct_total",
        "Accepted rows classified as UNKNOWN CCT"
    );
    describe_counter!(
        "ingest_aggregate_days_total",
        "Daily aggregate rows committed"
    );
    describe_gauge!(
        "ingest_last_batch_accept_ratio",
        "Accept ratio of the most recently committed batch"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();
        // At most one install can succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_register_does_not_panic() {
        ensure_metrics_init();
        register_ingest_metrics();
        register_ingest_metrics();
    }
}
