//! Client metrics
//!
//! OpenTelemetry instruments describing one client session. They are created
//! when the builder enables observability and exported through whatever
//! meter provider `init_observability` installed.
//!
//! # Metrics Collected
//!
//! - **session.state**: current [`SessionState`](crate::SessionState) (gauge)
//! - **requests.total**: calls sent, by method (counter)
//! - **replies.total**: replies routed, by method and status (counter)
//! - **request.duration**: send to reply latency in seconds (histogram)
//! - **errors.total**: transport and encoding failures, by kind (counter)
//! - **events.received**: host pushed events, by event type (counter)
//! - **frames.dropped**: inbound frames that did not decode or match (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};

pub struct ClientMetrics {
    pub session_state: Gauge<i64>,
    pub requests_total: Counter<u64>,
    pub replies_total: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub events_received: Counter<u64>,
    pub frames_dropped: Counter<u64>,
}

impl ClientMetrics {
    /// Instruments on the global meter provider, scoped by `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            session_state: meter
                .i64_gauge("bellite.client.session.state")
                .with_description(
                    "Session state (0=disconnected, 1=connecting, 2=authenticating, 3=ready, 4=closed)",
                )
                .build(),
            requests_total: meter
                .u64_counter("bellite.client.requests.total")
                .with_description("Total number of calls sent")
                .build(),
            replies_total: meter
                .u64_counter("bellite.client.replies.total")
                .with_description("Total number of replies routed to a pending call")
                .build(),
            request_duration: meter
                .f64_histogram("bellite.client.request.duration")
                .with_description("Time from send to reply in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("bellite.client.errors.total")
                .with_description("Total number of transport and encoding errors")
                .build(),
            events_received: meter
                .u64_counter("bellite.client.events.received")
                .with_description("Total number of events pushed by the host")
                .build(),
            frames_dropped: meter
                .u64_counter("bellite.client.frames.dropped")
                .with_description("Inbound frames that could not be decoded or routed")
                .build(),
        }
    }

    pub fn update_session_state(&self, state: i64) {
        self.session_state.record(state, &[]);
    }

    pub fn record_request(&self, method: &str) {
        self.requests_total
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }

    /// Record a routed reply; `status` is "ok" or "error"
    pub fn record_reply(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.replies_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type.to_string())]);
    }

    pub fn record_event(&self, evt_type: &str) {
        self.events_received
            .add(1, &[KeyValue::new("evt_type", evt_type.to_string())]);
    }

    pub fn record_dropped_frame(&self, reason: &str) {
        self.frames_dropped
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
    }
}
