//! Prometheus metrics for the bookshelf server.
//!
//! Counters cover ingestion outcomes, compensation and deletion. The
//! `/metrics` endpoint is unauthenticated; restrict it at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use shelf_core::FailureCode;
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Ingestion
pub static BOOKS_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shelf_books_ingested_total",
        "Total number of files stored with a metadata record",
    )
    .expect("metric creation failed")
});

pub static INGEST_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "shelf_ingest_failures_total",
            "Total per-file ingestion failures by failure code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shelf_bytes_uploaded_total",
        "Total bytes of committed uploads",
    )
    .expect("metric creation failed")
});

pub static INGEST_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "shelf_ingest_file_duration_seconds",
            "Time taken to ingest a single file, successful or not",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

// Compensation
pub static BLOB_ROLLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shelf_blob_rollbacks_total",
        "Total compensating blob deletes after a failed metadata insert",
    )
    .expect("metric creation failed")
});

pub static BLOB_ROLLBACK_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shelf_blob_rollback_failures_total",
        "Total compensating blob deletes that failed and left an orphan",
    )
    .expect("metric creation failed")
});

// Deletion
pub static BOOKS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shelf_books_deleted_total",
        "Total number of book records deleted",
    )
    .expect("metric creation failed")
});

pub static BLOB_DELETE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shelf_blob_delete_failures_total",
        "Total blob deletes that failed while deleting a book",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(BOOKS_INGESTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INGEST_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INGEST_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_ROLLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_ROLLBACK_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BOOKS_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_DELETE_FAILURES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus text exposition.
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

/// Helper to record a per-file ingestion failure.
pub fn record_ingest_failure(code: FailureCode) {
    INGEST_FAILURES.with_label_values(&[code.as_str()]).inc();
}
