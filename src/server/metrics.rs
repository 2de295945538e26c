use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

use crate::mirror_store::CatalogCounts;

/// Metric name prefix for all mirror metrics
const PREFIX: &str = "catalog_mirror";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Sync Metrics
    pub static ref SYNC_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_sync_runs_total"), "Sync runs by outcome"),
        &["status"]
    ).expect("Failed to create sync_runs_total metric");

    pub static ref SYNC_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_sync_duration_seconds"),
            "Duration of a full sync in seconds"
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0])
    ).expect("Failed to create sync_duration_seconds metric");

    pub static ref SYNC_LAST_SUCCESS_TIMESTAMP: Gauge = Gauge::new(
        format!("{PREFIX}_sync_last_success_timestamp_seconds"),
        "Unix time of the last successful sync"
    ).expect("Failed to create sync_last_success_timestamp metric");

    // Mirror Metrics
    pub static ref MIRRORED_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_mirrored_items_total"), "Rows in the mirror by type"),
        &["type"]
    ).expect("Failed to create mirrored_items_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Already registered errors are expected when tests call this repeatedly
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_LAST_SUCCESS_TIMESTAMP.clone()));
    let _ = REGISTRY.register(Box::new(MIRRORED_ITEMS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn set_mirrored_items(counts: &CatalogCounts) {
    MIRRORED_ITEMS_TOTAL
        .with_label_values(&["integration"])
        .set(counts.integrations as f64);
    MIRRORED_ITEMS_TOTAL
        .with_label_values(&["server"])
        .set(counts.servers as f64);
    MIRRORED_ITEMS_TOTAL
        .with_label_values(&["link"])
        .set(counts.links as f64);
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record the outcome of a sync run. `status` is `succeeded`, `failed` or
/// `rejected`.
pub fn record_sync_run(status: &str, duration: Duration) {
    SYNC_RUNS_TOTAL.with_label_values(&[status]).inc();
    if status == "rejected" {
        return;
    }
    SYNC_DURATION_SECONDS.observe(duration.as_secs_f64());
    if status == "succeeded" {
        SYNC_LAST_SUCCESS_TIMESTAMP.set(chrono::Utc::now().timestamp() as f64);
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
