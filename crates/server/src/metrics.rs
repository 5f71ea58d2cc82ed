//! Prometheus metrics for the publish server.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no package coordinates or keys, only aggregate counts.
//! Restrict the endpoint to scraper networks at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use packyard_core::ErrorKind;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static PUBLISH_ATTEMPTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packyard_publish_attempts_total",
        "Total number of publish requests received",
    )
    .expect("metric creation failed")
});

pub static PUBLISH_SUCCEEDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packyard_publish_succeeded_total",
        "Total number of package versions published",
    )
    .expect("metric creation failed")
});

pub static PUBLISH_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "packyard_publish_errors_total",
            "Total publish failures by error kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packyard_bytes_uploaded_total",
        "Total archive bytes written to storage",
    )
    .expect("metric creation failed")
});

pub static PARTS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packyard_parts_uploaded_total",
        "Total multipart parts written to storage",
    )
    .expect("metric creation failed")
});

pub static PART_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packyard_part_retries_total",
        "Total multipart part uploads retried after a failure",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "packyard_uploads_aborted_total",
        "Total multipart uploads aborted before finalize",
    )
    .expect("metric creation failed")
});

pub static PUBLISH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "packyard_publish_duration_seconds",
            "Time taken to handle a publish request",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PUBLISH_ATTEMPTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PUBLISH_SUCCEEDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PUBLISH_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PARTS_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PART_RETRIES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_ABORTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PUBLISH_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a publish failure by kind.
pub fn record_publish_error(kind: ErrorKind) {
    PUBLISH_ERRORS.with_label_values(&[kind.as_str()]).inc();
}
