//! Request accounting for the queue API.
//!
//! Sits outside every other layer, so responses axum produces on its own
//! (unknown routes, bad JSON bodies, wrong methods) and the 401s from the
//! identity layer are counted alongside handler results. The path is handed
//! to `record_http_request` raw; that function folds office hour ids into
//! `{id}` before they reach a label.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Time the request and record method, path, status and latency once the
/// response is ready.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}
