#![deny(unsafe_code)]

//! # REST metrics endpoint (ambient concretization)
//!
//! A small `axum` server exposing `/metrics` (Prometheus text exposition)
//! and `/healthz`, running on its own thread with its own Tokio runtime so
//! the rest of the engine stays on plain OS threads (§5).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};

/// Counters and gauges tracked across one dump run.
pub struct DumperMetrics {
    registry: Registry,
    pub inventory_files_produced: IntCounter,
    pub data_files_produced: IntCounter,
    pub bytes_written: IntCounter,
    pub keys_filtered: IntCounter,
    pub task_failures: IntCounter,
    pub checkpoint_size: IntGauge,
}

impl Default for DumperMetrics {
    fn default() -> Self {
        DumperMetrics::new()
    }
}

impl DumperMetrics {
    pub fn new() -> DumperMetrics {
        let registry = Registry::new();
        let inventory_files_produced =
            IntCounter::new("cdump_inventory_files_produced_total", "Inventory files closed out by the metadump task").unwrap();
        let data_files_produced =
            IntCounter::new("cdump_data_files_produced_total", "Data files closed out by the key/value writer").unwrap();
        let bytes_written = IntCounter::new("cdump_bytes_written_total", "Bytes written to inventory and data files").unwrap();
        let keys_filtered = IntCounter::new("cdump_keys_filtered_total", "Keys dropped by the TTL or IP-shard filter").unwrap();
        let task_failures = IntCounter::new("cdump_task_failures_total", "Tasks that ended with a task-fatal error").unwrap();
        let checkpoint_size = IntGauge::new("cdump_checkpoint_size", "Number of inventory files marked complete in the checkpoint log").unwrap();

        for metric in [&inventory_files_produced, &data_files_produced, &bytes_written, &keys_filtered, &task_failures] {
            registry.register(Box::new(metric.clone())).expect("metric registration cannot fail for a fresh registry");
        }
        registry.register(Box::new(checkpoint_size.clone())).expect("metric registration cannot fail for a fresh registry");

        DumperMetrics {
            registry,
            inventory_files_produced,
            data_files_produced,
            bytes_written,
            keys_filtered,
            task_failures,
            checkpoint_size,
        }
    }

    pub fn encode_text(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }
}

async fn metrics_handler(metrics: axum::extract::State<Arc<DumperMetrics>>) -> impl IntoResponse {
    metrics.encode_text()
}

async fn healthz_handler() -> impl IntoResponse {
    "ok"
}

fn router(metrics: Arc<DumperMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics)
}

/// Starts the metrics server on its own thread, returning the thread handle.
/// The server runs until the process exits; there is no graceful shutdown
/// hook since the coordinator only ever stops it by exiting.
pub fn spawn(addr: SocketAddr, metrics: Arc<DumperMetrics>) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("cdump-metrics".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("failed to start metrics runtime");
            runtime.block_on(async move {
                let app = router(metrics);
                if let Err(err) = axum::Server::bind(&addr).serve(app.into_make_service()).await {
                    tracing::error!(%err, "metrics server exited");
                }
            });
        })
        .expect("failed to spawn metrics server thread")
}
