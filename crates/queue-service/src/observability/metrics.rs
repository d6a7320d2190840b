//! Metrics definitions for the queue service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `queue_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `transition`: one value per `Transition` variant
//! - `outcome`: `accepted` or `rejected`
//! - `sweep`: `qr_rotation` or `auto_no_show`
//! - `operation`: bounded by repository code

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("queue_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("queue_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("queue_sweep".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set sweep buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `queue_http_requests_total`, `queue_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("queue_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("queue_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to bound label cardinality.
///
/// Office hour ids are replaced with `{id}`.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/api/v1/queue/scan" => path.to_string(),
        _ => normalize_office_hour_endpoint(path),
    }
}

fn normalize_office_hour_endpoint(path: &str) -> String {
    const PREFIX: &str = "/api/v1/office-hours/";

    let Some(rest) = path.strip_prefix(PREFIX) else {
        return "/other".to_string();
    };

    let mut segments = rest.split('/');
    let id = segments.next().unwrap_or_default();
    let queue = segments.next();
    let action = segments.next();

    if id.is_empty() || queue != Some("queue") || segments.next().is_some() {
        return "/other".to_string();
    }

    match action {
        None => "/api/v1/office-hours/{id}/queue".to_string(),
        Some(action @ ("join" | "me" | "call-next" | "complete" | "no-show")) => {
            format!("/api/v1/office-hours/{{id}}/queue/{action}")
        }
        Some(_) => "/other".to_string(),
    }
}

// ============================================================================
// Queue Metrics
// ============================================================================

/// Record a committed queue entry transition.
///
/// Metric: `queue_transitions_total`
/// Labels: `transition`
pub fn record_transition(transition: &str) {
    counter!("queue_transitions_total",
        "transition" => transition.to_string()
    )
    .increment(1);
}

/// Record a QR scan attempt.
///
/// Metric: `queue_scan_attempts_total`
/// Labels: `outcome` ("accepted" or "rejected")
pub fn record_scan_attempt(outcome: &str) {
    counter!("queue_scan_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one pass of a background sweep.
///
/// Metric: `queue_sweep_duration_seconds`, `queue_sweep_items_total`
/// Labels: `sweep`
pub fn record_sweep(sweep: &str, items: u64, duration: Duration) {
    histogram!("queue_sweep_duration_seconds",
        "sweep" => sweep.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("queue_sweep_items_total",
        "sweep" => sweep.to_string()
    )
    .increment(items);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `queue_db_query_duration_seconds`, `queue_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("queue_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("queue_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against the global no-op recorder; they exercise the code
    // paths without asserting on recorded values.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(2));
        record_http_request(
            "POST",
            "/api/v1/office-hours/3f1c0d1e-0000-4000-8000-000000000001/queue/call-next",
            409,
            Duration::from_millis(12),
        );
        record_http_request("POST", "/api/v1/queue/scan", 400, Duration::from_millis(4));
        record_http_request("GET", "/api/v1/office-hours/x/queue", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(409), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_endpoint_static_paths() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/api/v1/queue/scan"), "/api/v1/queue/scan");
    }

    #[test]
    fn test_normalize_endpoint_office_hour_paths() {
        let id = "3f1c0d1e-0000-4000-8000-000000000001";

        assert_eq!(
            normalize_endpoint(&format!("/api/v1/office-hours/{id}/queue")),
            "/api/v1/office-hours/{id}/queue"
        );
        for action in ["join", "me", "call-next", "complete", "no-show"] {
            assert_eq!(
                normalize_endpoint(&format!("/api/v1/office-hours/{id}/queue/{action}")),
                format!("/api/v1/office-hours/{{id}}/queue/{action}")
            );
        }
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/office-hours/"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/office-hours/abc"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/office-hours/abc/queue/delete"), "/other");
        assert_eq!(
            normalize_endpoint("/api/v1/office-hours/abc/queue/join/extra"),
            "/other"
        );
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_record_queue_metrics() {
        record_transition("called");
        record_transition("timed_out");
        record_scan_attempt("accepted");
        record_scan_attempt("rejected");
        record_sweep("qr_rotation", 3, Duration::from_millis(8));
        record_sweep("no_show", 0, Duration::from_millis(1));
        record_db_query("lock_session", "success", Duration::from_millis(1));
    }
}
