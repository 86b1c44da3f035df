//! Prometheus metrics for the updraft server.
//!
//! Labels carry platforms and error reasons only, never runtime versions or
//! release paths, so cardinality stays fixed.
//!
//! The `/metrics` endpoint is unauthenticated and should be reachable by the
//! scraper only; restrict it at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Ingestion
pub static RELEASES_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "updraft_releases_ingested_total",
        "Total number of release bundles ingested",
    )
    .expect("metric creation failed")
});

pub static INGEST_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "updraft_ingest_failures_total",
            "Total failed ingestions by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

// Serving
pub static ASSETS_SERVED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "updraft_assets_served_total",
            "Total assets resolved for download by platform and kind",
        ),
        &["platform", "kind"],
    )
    .expect("metric creation failed")
});

pub static ASSET_BYTES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "updraft_asset_bytes_served_total",
        "Total decompressed asset bytes sent to clients",
    )
    .expect("metric creation failed")
});

pub static OVERSIZED_ASSETS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "updraft_oversized_assets_total",
        "Total assets served that exceed the oversized threshold",
    )
    .expect("metric creation failed")
});

pub static INTEGRITY_FAULTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "updraft_integrity_faults_total",
            "Total archive/manifest disagreements detected while serving, by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static ASSET_RESOLUTION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "updraft_asset_resolution_duration_seconds",
            "Time taken to resolve an asset against the active release",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

pub static MANIFEST_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "updraft_manifest_requests_total",
            "Total update manifest requests by platform",
        ),
        &["platform"],
    )
    .expect("metric creation failed")
});

// Rollback
pub static ROLLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("updraft_rollbacks_total", "Total rollbacks recorded")
        .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers can call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(RELEASES_INGESTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INGEST_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ASSETS_SERVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ASSET_BYTES_SERVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OVERSIZED_ASSETS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INTEGRITY_FAULTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ASSET_RESOLUTION_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MANIFEST_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ROLLBACKS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
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
