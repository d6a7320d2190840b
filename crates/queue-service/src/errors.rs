//! Queue service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Client
//! messages for server-side failures are generic; details are logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Name of the partial unique index backing the single-active invariant.
const SINGLE_ACTIVE_CONSTRAINT: &str = "queue_entries_single_active_slot";

/// Message returned when a session already has a ready or in-progress entry.
pub const ALREADY_ACTIVE_MESSAGE: &str = "a student is already ready/in progress";

/// Queue service error type.
///
/// Maps to HTTP status codes:
/// - Database, Internal: 500 Internal Server Error
/// - Unauthenticated: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - NotFound: 404 Not Found
/// - BadRequest: 400 Bad Request
/// - Conflict: 409 Conflict
///
/// Forbidden, NotFound, BadRequest and Conflict are never worth retrying
/// unchanged.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            QueueError::Database(_) | QueueError::Internal(_) => 500,
            QueueError::Unauthenticated(_) => 401,
            QueueError::Forbidden(_) => 403,
            QueueError::NotFound(_) => 404,
            QueueError::BadRequest(_) => 400,
            QueueError::Conflict(_) => 409,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            QueueError::Database(err) => {
                tracing::error!(target: "queue.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            QueueError::Unauthenticated(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", reason.clone())
            }
            QueueError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            QueueError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            QueueError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            QueueError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            QueueError::Internal(err) => {
                tracing::error!(target: "queue.internal", error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert sqlx errors to QueueError.
///
/// Unique violations become `Conflict`: two writers raced on the same
/// session and the partial unique indexes caught the loser.
impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let message = if db_err.constraint() == Some(SINGLE_ACTIVE_CONSTRAINT) {
                    ALREADY_ACTIVE_MESSAGE
                } else {
                    "conflicting concurrent update"
                };
                return QueueError::Conflict(message.to_string());
            }
        }
        QueueError::Database(err.to_string())
    }
}

impl From<crate::crypto::CodecError> for QueueError {
    fn from(err: crate::crypto::CodecError) -> Self {
        QueueError::Internal(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            QueueError::BadRequest("no waiting students".to_string()).to_string(),
            "Bad request: no waiting students"
        );
        assert_eq!(
            QueueError::Conflict(ALREADY_ACTIVE_MESSAGE.to_string()).to_string(),
            "Conflict: a student is already ready/in progress"
        );
        assert_eq!(
            QueueError::NotFound("office hour".to_string()).to_string(),
            "Not found: office hour"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(QueueError::Database("x".to_string()).status_code(), 500);
        assert_eq!(QueueError::Internal("x".to_string()).status_code(), 500);
        assert_eq!(QueueError::Unauthenticated("x".to_string()).status_code(), 401);
        assert_eq!(QueueError::Forbidden("x".to_string()).status_code(), 403);
        assert_eq!(QueueError::NotFound("x".to_string()).status_code(), 404);
        assert_eq!(QueueError::BadRequest("x".to_string()).status_code(), 400);
        assert_eq!(QueueError::Conflict("x".to_string()).status_code(), 409);
    }

    #[tokio::test]
    async fn test_into_response_database_error_is_generic() {
        let response = QueueError::Database("password auth failed for user".to_string())
            .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "DATABASE_ERROR");
        assert_eq!(body["error"]["message"], "An internal database error occurred");
    }

    #[tokio::test]
    async fn test_into_response_internal_error_is_generic() {
        let response = QueueError::Internal("rng failure".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body["error"]["message"].as_str().unwrap().contains("rng"));
    }

    #[tokio::test]
    async fn test_into_response_bad_request_keeps_message() {
        let response =
            QueueError::BadRequest("invalid or expired token".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "invalid or expired token");
    }

    #[tokio::test]
    async fn test_into_response_conflict() {
        let response = QueueError::Conflict(ALREADY_ACTIVE_MESSAGE.to_string()).into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(body["error"]["message"], ALREADY_ACTIVE_MESSAGE);
    }

    #[tokio::test]
    async fn test_into_response_forbidden_and_unauthenticated() {
        let forbidden = QueueError::Forbidden("not your office hour".to_string()).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let unauth = QueueError::Unauthenticated("missing caller identity".to_string())
            .into_response();
        assert_eq!(unauth.status(), StatusCode::UNAUTHORIZED);
        let body = read_body_json(unauth.into_body()).await;
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    }

    #[test]
    fn test_from_sqlx_row_not_found_is_database_error() {
        let err: QueueError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, QueueError::Database(_)));
    }

    #[test]
    fn test_from_codec_error_is_internal() {
        let err: QueueError = crate::crypto::CodecError::Rng.into();
        assert!(matches!(err, QueueError::Internal(_)));
    }
}
