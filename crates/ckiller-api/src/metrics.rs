//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "ckiller_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "ckiller_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "ckiller_http_requests_in_flight";

    // Event stream metrics
    pub const SSE_STREAMS_TOTAL: &str = "ckiller_sse_streams_total";
    pub const SSE_STREAMS_ACTIVE: &str = "ckiller_sse_streams_active";
    pub const SSE_EVENTS_SENT: &str = "ckiller_sse_events_sent_total";

    // Job metrics
    pub const JOBS_STARTED_TOTAL: &str = "ckiller_jobs_started_total";
    pub const JOBS_REJECTED_TOTAL: &str = "ckiller_jobs_rejected_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an opened event stream.
pub fn record_sse_opened(job: &str) {
    counter!(names::SSE_STREAMS_TOTAL, "job" => job.to_string()).increment(1);
    gauge!(names::SSE_STREAMS_ACTIVE).increment(1.0);
}

pub fn record_sse_closed() {
    gauge!(names::SSE_STREAMS_ACTIVE).decrement(1.0);
}

pub fn record_sse_event(job: &str) {
    counter!(names::SSE_EVENTS_SENT, "job" => job.to_string()).increment(1);
}

/// Record a job accepted by a start endpoint.
pub fn record_job_started(job: &str) {
    counter!(names::JOBS_STARTED_TOTAL, "job" => job.to_string()).increment(1);
}

/// Record a start request refused because the job is already running.
pub fn record_job_rejected(job: &str) {
    counter!(names::JOBS_REJECTED_TOTAL, "job" => job.to_string()).increment(1);
}

static PROJECT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/projects/[a-zA-Z0-9_-]+").unwrap());
static ARTIFACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/artifacts/[a-zA-Z0-9_.-]+").unwrap());

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = PROJECT_ID_RE.replace_all(path, "/projects/:id");
    let path = ARTIFACT_RE.replace_all(&path, "/artifacts/:name");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/projects/550e8400-e29b-41d4-a716-446655440000/jobs/video/events"),
            "/api/projects/:id/jobs/video/events"
        );
        assert_eq!(
            sanitize_path("/api/projects/abc123/artifacts/narration_001.mp3"),
            "/api/projects/:id/artifacts/:name"
        );
        assert_eq!(sanitize_path("/api/projects"), "/api/projects");
    }
}
