//! Client metrics definitions
//!
//! OpenTelemetry instruments describing connection health and traffic. They
//! are recorded only when the client was built with observability enabled
//! and are exported by whatever meter provider the application installed.
//!
//! # Metrics Collected
//!
//! - **linerpc.client.connection.state**: current state (gauge)
//! - **linerpc.client.requests.total**: requests completed (counter)
//! - **linerpc.client.request.duration**: request latency in seconds (histogram)
//! - **linerpc.client.errors.total**: errors by kind (counter)
//! - **linerpc.client.reconnection.attempts**: automatic reconnects tried (counter)
//! - **linerpc.client.reconnection.success**: automatic reconnects that worked (counter)
//! - **linerpc.client.batch.size**: parameters per batch (histogram)
//! - **linerpc.client.notifications.received**: notifications by topic (counter)
//! - **linerpc.client.keepalive.probes**: liveness probes by outcome (counter)

use crate::connection_state::ConnectionState;
use linerpc_core::Error;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Connection state (0=disconnected, 1=connecting, 2=connected, 3=closed)
    pub connection_state: Gauge<i64>,
    /// Total number of requests completed
    pub requests_total: Counter<u64>,
    /// Request duration in seconds
    pub request_duration: Histogram<f64>,
    /// Total number of errors
    pub errors_total: Counter<u64>,
    /// Total number of reconnection attempts
    pub reconnection_attempts: Counter<u64>,
    /// Total number of successful reconnections
    pub reconnection_success: Counter<u64>,
    /// Batch size distribution
    pub batch_size: Histogram<u64>,
    /// Total number of notifications received
    pub notifications_received: Counter<u64>,
    /// Total number of keepalive probes sent
    pub keepalive_probes: Counter<u64>,
}

impl ClientMetrics {
    /// Create a new ClientMetrics instance on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    /// Create a new ClientMetrics instance with a custom meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("linerpc.client.connection.state")
                .with_description("Connection state (0=disconnected, 1=connecting, 2=connected, 3=closed)")
                .build(),
            requests_total: meter
                .u64_counter("linerpc.client.requests.total")
                .with_description("Total number of requests completed")
                .build(),
            request_duration: meter
                .f64_histogram("linerpc.client.request.duration")
                .with_description("Request duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("linerpc.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            reconnection_attempts: meter
                .u64_counter("linerpc.client.reconnection.attempts")
                .with_description("Total number of automatic reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("linerpc.client.reconnection.success")
                .with_description("Total number of successful reconnections")
                .build(),
            batch_size: meter
                .u64_histogram("linerpc.client.batch.size")
                .with_description("Number of parameters in batch requests")
                .build(),
            notifications_received: meter
                .u64_counter("linerpc.client.notifications.received")
                .with_description("Total number of notifications received")
                .build(),
            keepalive_probes: meter
                .u64_counter("linerpc.client.keepalive.probes")
                .with_description("Total number of keepalive probes sent")
                .build(),
        }
    }

    /// Update connection state
    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.as_gauge(), &[]);
    }

    /// Record a completed request
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    /// Record an error
    pub fn record_error(&self, error: &Error) {
        let attributes = &[KeyValue::new("error_type", error_kind(error))];
        self.errors_total.add(1, attributes);
    }

    /// Record a reconnection attempt
    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    /// Record a successful reconnection
    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    /// Record a batch operation
    pub fn record_batch(&self, size: u64) {
        self.batch_size.record(size, &[]);
    }

    /// Record a notification received
    pub fn record_notification(&self, method: &str) {
        let attributes = &[KeyValue::new("method", method.to_string())];
        self.notifications_received.add(1, attributes);
    }

    /// Record a keepalive probe and how it ended
    pub fn record_keepalive_probe(&self, outcome: &'static str) {
        self.keepalive_probes.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Stable label for an error variant
fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::Rpc(_) => "rpc",
        Error::Serialization(_) => "serialization",
        Error::Framing(_) => "framing",
        Error::Io(_) => "io",
        Error::Tls(_) => "tls",
        Error::Configuration(_) => "configuration",
        Error::InvalidRequest(_) => "invalid_request",
        Error::NotConnected => "not_connected",
        Error::ConnectionClosed => "connection_closed",
        Error::ConnectTimeout => "connect_timeout",
        Error::KeepaliveTimeout => "keepalive_timeout",
        Error::ClientClosed => "client_closed",
        Error::Internal(_) => "internal",
    }
}
