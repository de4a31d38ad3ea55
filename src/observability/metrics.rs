//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define balancer metrics (queue, sessions, dials, node health)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `lb_queue_depth` (gauge): clients waiting for a backend
//! - `lb_dial_failures_total` (counter): dial rounds aborted for lack of local resources
//! - `lb_open_sessions` (gauge): live client/backend pairings
//! - `lb_sessions_total` (counter): sessions ever created
//! - `lb_node_active` (gauge, `node`): 1=active, 0=inactive
//! - `lb_pool_idle` (gauge): pooled connections ready for assignment
//! - `lb_pool_connecting` (gauge): dials in flight

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

pub fn record_queue_depth(depth: usize) {
    gauge!("lb_queue_depth").set(depth as f64);
}

pub fn record_dial_failure() {
    counter!("lb_dial_failures_total").increment(1);
}

pub fn record_session_opened(open: usize) {
    counter!("lb_sessions_total").increment(1);
    gauge!("lb_open_sessions").set(open as f64);
}

pub fn record_session_closed(open: usize) {
    gauge!("lb_open_sessions").set(open as f64);
}

pub fn record_node_active(node: &str, active: bool) {
    gauge!("lb_node_active", "node" => node.to_string()).set(if active { 1.0 } else { 0.0 });
}

pub fn record_pool(idle: usize, connecting: usize) {
    gauge!("lb_pool_idle").set(idle as f64);
    gauge!("lb_pool_connecting").set(connecting as f64);
}
