//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wallet_endpoint_health` (gauge): 1=eligible, 0=backing off, by endpoint
//! - `wallet_endpoint_failures_total` (counter): reported failures, by endpoint
//! - `wallet_rpc_duration_seconds` (histogram): request latency, by method
//! - `wallet_balance_polls_total` (counter): poll results, by result
//! - `wallet_broadcasts_total` (counter): broadcast attempts, by leg and result
//! - `wallet_settlements_total` (counter): finished settlements, by outcome
//!
//! # Design Decisions
//! - Helpers keep metric names in one place
//! - Without `init_metrics` every helper is a no-op

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus scrape endpoint. Must be called inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_endpoint_health(endpoint: &str, eligible: bool) {
    gauge!("wallet_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if eligible { 1.0 } else { 0.0 });
}

pub fn record_endpoint_failure(endpoint: &str) {
    counter!("wallet_endpoint_failures_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_rpc_latency(method: &str, elapsed: Duration) {
    histogram!("wallet_rpc_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_balance_poll(success: bool) {
    let result = if success { "live" } else { "stale" };
    counter!("wallet_balance_polls_total", "result" => result).increment(1);
}

pub fn record_broadcast(leg: &'static str, accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    counter!("wallet_broadcasts_total", "leg" => leg, "result" => result).increment(1);
}

pub fn record_settlement(outcome: &'static str) {
    counter!("wallet_settlements_total", "outcome" => outcome).increment(1);
}
