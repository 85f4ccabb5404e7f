//! Metrics collection and export for Ember.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "ember_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "ember_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "ember_connections_rejected_total";
    pub const EVENTS_TOTAL: &str = "ember_events_total";
    pub const EVENTS_BYTES: &str = "ember_events_bytes";
    pub const DELIVERIES_TOTAL: &str = "ember_deliveries_total";
    pub const REGISTRATIONS_TOTAL: &str = "ember_registrations_total";
    pub const ONLINE_USERS: &str = "ember_online_users";
    pub const LATENCY_SECONDS: &str = "ember_latency_seconds";
    pub const ERRORS_TOTAL: &str = "ember_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused at the connection limit"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Client events handled, by event name");
    metrics::describe_counter!(names::EVENTS_BYTES, "Total bytes of client events handled");
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Realtime delivery attempts, by outcome"
    );
    metrics::describe_counter!(
        names::REGISTRATIONS_TOTAL,
        "Successful user registrations"
    );
    metrics::describe_gauge!(names::ONLINE_USERS, "Users with a live connection");
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Client event processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a connection refused at the limit.
pub fn record_rejection() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

/// Record a handled client event.
pub fn record_event(event: &'static str, bytes: usize) {
    counter!(names::EVENTS_TOTAL, "event" => event).increment(1);
    counter!(names::EVENTS_BYTES).increment(bytes as u64);
}

/// Record one delivery attempt.
pub fn record_delivery(outcome: &'static str) {
    counter!(names::DELIVERIES_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a successful registration.
pub fn record_registration() {
    counter!(names::REGISTRATIONS_TOTAL).increment(1);
}

/// Update the online user count.
pub fn set_online_users(count: usize) {
    gauge!(names::ONLINE_USERS).set(count as f64);
}

/// Record event latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
