//! Queue handlers.
//!
//! Thin adapters from HTTP onto [`QueueEngine`](crate::services::QueueEngine).
//! Every route here sits behind `require_caller`, so a [`Caller`] is always
//! present in request extensions.
//!
//! Student endpoints:
//! - `POST /api/v1/office-hours/{id}/queue/join`
//! - `GET /api/v1/office-hours/{id}/queue/me`
//! - `POST /api/v1/queue/scan`
//!
//! Provider endpoints:
//! - `GET /api/v1/office-hours/{id}/queue`
//! - `POST /api/v1/office-hours/{id}/queue/call-next`
//! - `POST /api/v1/office-hours/{id}/queue/complete`
//! - `POST /api/v1/office-hours/{id}/queue/no-show`

use crate::errors::QueueError;
use crate::models::{Caller, JoinQueueRequest, ScanQrRequest};
use crate::routes::AppState;
use crate::services::{ProviderView, StudentView};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::types::OfficeHourId;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

fn parse_office_hour_id(raw: &str) -> Result<OfficeHourId, QueueError> {
    Uuid::parse_str(raw)
        .map(OfficeHourId)
        .map_err(|_| QueueError::BadRequest("invalid office hour id".to_string()))
}

/// Handler for POST /api/v1/office-hours/{id}/queue/join
///
/// Body is optional; `{ "purpose": "..." }` when present.
///
/// # Response
///
/// - 200 OK: The caller's queue status (existing entry if already queued)
/// - 400 Bad Request: Purpose too long or queue closed
/// - 403 Forbidden: Caller owns the office hour
/// - 404 Not Found: Office hour does not exist
#[instrument(
    skip_all,
    name = "queue.handlers.join",
    fields(method = "POST", endpoint = "/api/v1/office-hours/{id}/queue/join")
)]
pub async fn join_queue(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(office_hour_id): Path<String>,
    body: Option<Json<JoinQueueRequest>>,
) -> Result<Json<StudentView>, QueueError> {
    let office_hour_id = parse_office_hour_id(&office_hour_id)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let view = state
        .engine
        .join_queue(caller, office_hour_id, request.purpose.as_deref())
        .await?;

    Ok(Json(view))
}

/// Handler for GET /api/v1/office-hours/{id}/queue/me
#[instrument(
    skip_all,
    name = "queue.handlers.me",
    fields(method = "GET", endpoint = "/api/v1/office-hours/{id}/queue/me")
)]
pub async fn get_my_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(office_hour_id): Path<String>,
) -> Result<Json<StudentView>, QueueError> {
    let office_hour_id = parse_office_hour_id(&office_hour_id)?;
    Ok(Json(state.engine.student_view(caller, office_hour_id).await?))
}

/// Handler for POST /api/v1/queue/scan
///
/// # Response
///
/// - 200 OK: Checked in, entry is now in progress
/// - 400 Bad Request: "invalid or expired token" for every rejection
#[instrument(
    skip_all,
    name = "queue.handlers.scan",
    fields(method = "POST", endpoint = "/api/v1/queue/scan")
)]
pub async fn scan_qr(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<ScanQrRequest>,
) -> Result<Json<StudentView>, QueueError> {
    Ok(Json(state.engine.scan_qr(caller, &request.token).await?))
}

/// Handler for GET /api/v1/office-hours/{id}/queue
///
/// Provider dashboard, including the live QR token while a student is ready.
#[instrument(
    skip_all,
    name = "queue.handlers.provider_view",
    fields(method = "GET", endpoint = "/api/v1/office-hours/{id}/queue")
)]
pub async fn get_provider_view(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(office_hour_id): Path<String>,
) -> Result<Json<ProviderView>, QueueError> {
    let office_hour_id = parse_office_hour_id(&office_hour_id)?;
    Ok(Json(state.engine.provider_view(caller, office_hour_id).await?))
}

/// Handler for POST /api/v1/office-hours/{id}/queue/call-next
///
/// # Response
///
/// - 200 OK: Provider view with the called student and a fresh QR token
/// - 400 Bad Request: Nobody is waiting
/// - 403 Forbidden: Caller does not own the office hour
/// - 409 Conflict: A student is already ready or in progress
#[instrument(
    skip_all,
    name = "queue.handlers.call_next",
    fields(method = "POST", endpoint = "/api/v1/office-hours/{id}/queue/call-next")
)]
pub async fn call_next(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(office_hour_id): Path<String>,
) -> Result<Json<ProviderView>, QueueError> {
    let office_hour_id = parse_office_hour_id(&office_hour_id)?;
    Ok(Json(state.engine.call_next(caller, office_hour_id).await?))
}

/// Handler for POST /api/v1/office-hours/{id}/queue/complete
#[instrument(
    skip_all,
    name = "queue.handlers.complete",
    fields(method = "POST", endpoint = "/api/v1/office-hours/{id}/queue/complete")
)]
pub async fn complete_current(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(office_hour_id): Path<String>,
) -> Result<Json<ProviderView>, QueueError> {
    let office_hour_id = parse_office_hour_id(&office_hour_id)?;
    Ok(Json(
        state.engine.complete_current(caller, office_hour_id).await?,
    ))
}

/// Handler for POST /api/v1/office-hours/{id}/queue/no-show
#[instrument(
    skip_all,
    name = "queue.handlers.no_show",
    fields(method = "POST", endpoint = "/api/v1/office-hours/{id}/queue/no-show")
)]
pub async fn mark_no_show(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(office_hour_id): Path<String>,
) -> Result<Json<ProviderView>, QueueError> {
    let office_hour_id = parse_office_hour_id(&office_hour_id)?;
    Ok(Json(
        state
            .engine
            .mark_no_show_current(caller, office_hour_id)
            .await?,
    ))
}
