//! Prometheus metrics for the relay.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "framewire_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "framewire_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "framewire_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "framewire_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "framewire_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "framewire_ws_messages_sent_total";

    // Frame metrics
    pub const FRAMES_RECEIVED_TOTAL: &str = "framewire_frames_received_total";
    pub const FRAMES_PROCESSED_TOTAL: &str = "framewire_frames_processed_total";
    pub const FRAME_FAILURES_TOTAL: &str = "framewire_frame_failures_total";
    pub const FRAME_DURATION_SECONDS: &str = "framewire_frame_duration_seconds";
    pub const DETECTIONS_PER_FRAME: &str = "framewire_detections_per_frame";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record WebSocket event sent.
pub fn record_ws_message_sent(event: &str) {
    let labels = [("event", event.to_string())];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

/// Record an inbound frame.
pub fn record_frame_received() {
    counter!(names::FRAMES_RECEIVED_TOTAL).increment(1);
}

/// Record a frame that produced a `bboxes` event.
pub fn record_frame_processed(detections: usize, duration_secs: f64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
    histogram!(names::FRAME_DURATION_SECONDS).record(duration_secs);
    histogram!(names::DETECTIONS_PER_FRAME).record(detections as f64);
}

/// Record a frame or message that produced an `error` event.
pub fn record_frame_failure(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::FRAME_FAILURES_TOTAL, &labels).increment(1);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    // Route template, not the raw URI; unrouted requests share one label
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
