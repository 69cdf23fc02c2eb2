//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rate_limited_total` (counter): rejections by scope
//! - `gateway_rate_limit_entries` (gauge): live limiter windows
//! - `gateway_retries_total` (counter): retry attempts by service
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_circuit_rejections_total` (counter): fail-fast rejections
//! - `gateway_service_health` (gauge): 1=healthy, 0=unhealthy

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("service", service.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(scope: &'static str) {
    metrics::counter!("gateway_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_rate_limit_entries(entries: usize) {
    metrics::gauge!("gateway_rate_limit_entries").set(entries as f64);
}

pub fn record_retry(service: &str) {
    metrics::counter!("gateway_retries_total", "service" => service.to_string()).increment(1);
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("gateway_circuit_state", "service" => service.to_string()).set(value);
}

pub fn record_circuit_rejection(service: &str) {
    metrics::counter!("gateway_circuit_rejections_total", "service" => service.to_string())
        .increment(1);
}

pub fn record_service_health(service: &str, healthy: bool) {
    metrics::gauge!("gateway_service_health", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
