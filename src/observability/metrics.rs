//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by method, route, status
//! - `router_request_duration_seconds` (histogram): dispatch latency by route
//! - `router_loader_timeouts_total` (counter): loader budget overruns by route
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op
//! - Routes are labelled by pattern, never by concrete path, to bound
//!   cardinality

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with a scrape endpoint on `addr`.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &Method, route: &str, status: StatusCode, elapsed: Duration) {
    metrics::counter!(
        "router_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(
        "router_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_loader_timeout(route: &str) {
    metrics::counter!("router_loader_timeouts_total", "route" => route.to_string()).increment(1);
}
