//! Prometheus metrics for rate limit decisions and counter store health.
//!
//! The exporter is installed once at startup and serves the text exposition
//! format on the configured metrics listener. Metric registrations are
//! process-wide; everything else in the service is injected state.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;

use crate::error::{RatewardenError, Result};

/// Total rate limit requests processed, labeled by status, type and error.
pub const REQUESTS_TOTAL: &str = "rate_limit_requests_total";
/// Rate limit request latency histogram, labeled by request type.
pub const LATENCY_SECONDS: &str = "rate_limit_latency_seconds";
/// Redis operation failures, labeled by operation.
pub const REDIS_ERRORS_TOTAL: &str = "redis_errors_total";
/// Deferred updates dropped because the ingress queue was full.
pub const UPDATES_DROPPED_TOTAL: &str = "rate_limit_updates_dropped_total";
/// Admission cache entries removed by eviction or replacement.
pub const CACHE_EVICTIONS_TOTAL: &str = "admission_cache_evictions_total";

/// Standard Prometheus latency buckets.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus exporter on `addr` and register the metric set.
///
/// Must be called from within a Tokio runtime; the exporter serves scrapes on
/// its own listener task.
pub fn init(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(LATENCY_SECONDS.to_string()), LATENCY_BUCKETS)
        .map_err(|e| RatewardenError::Metrics(e.to_string()))?
        .install()
        .map_err(|e| RatewardenError::Metrics(e.to_string()))?;

    describe_counter!(
        REQUESTS_TOTAL,
        Unit::Count,
        "Total number of rate limit requests processed"
    );
    describe_histogram!(
        LATENCY_SECONDS,
        Unit::Seconds,
        "Rate limit request latency in seconds"
    );
    describe_counter!(REDIS_ERRORS_TOTAL, Unit::Count, "Total number of Redis errors");
    describe_counter!(
        UPDATES_DROPPED_TOTAL,
        Unit::Count,
        "Deferred counter updates dropped due to a full queue"
    );
    describe_counter!(
        CACHE_EVICTIONS_TOTAL,
        Unit::Count,
        "Admission cache entries evicted"
    );

    // Zero-initialize the required series so they appear before traffic does.
    counter!(REQUESTS_TOTAL, "status" => "success", "type" => "request", "error" => "")
        .absolute(0);
    counter!(UPDATES_DROPPED_TOTAL).absolute(0);
    counter!(CACHE_EVICTIONS_TOTAL).absolute(0);

    Ok(())
}

/// Record a completed rate limit request.
pub fn record_request_success() {
    counter!(REQUESTS_TOTAL, "status" => "success", "type" => "request", "error" => "")
        .increment(1);
}

/// Record a per-descriptor decision error (bad input or store failure).
pub fn record_request_error(error: impl Into<String>) {
    counter!(
        REQUESTS_TOTAL,
        "status" => "error",
        "type" => "request",
        "error" => error.into()
    )
    .increment(1);
}

/// Observe end-to-end request handling latency.
pub fn record_request_latency(seconds: f64) {
    histogram!(LATENCY_SECONDS, "type" => "request").record(seconds);
}

/// Record a failed Redis operation.
pub fn record_redis_error(operation: &'static str) {
    counter!(REDIS_ERRORS_TOTAL, "operation" => operation).increment(1);
}

/// Record a deferred update dropped on enqueue.
pub fn record_update_dropped() {
    counter!(UPDATES_DROPPED_TOTAL).increment(1);
}

/// Record an admission cache eviction.
pub fn record_cache_eviction() {
    counter!(CACHE_EVICTIONS_TOTAL).increment(1);
}
