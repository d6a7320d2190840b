//! Caller identity middleware for protected routes.
//!
//! The upstream gateway authenticates users and forwards their identity in
//! two headers:
//!
//! - `x-user-id` - the caller's UUID
//! - `x-user-role` - `student` or `provider`
//!
//! `require_caller` parses both and injects a [`Caller`] into request
//! extensions. Missing or malformed identity is rejected with 401 before any
//! handler runs.

use crate::errors::QueueError;
use crate::models::Caller;
use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use common::types::{Role, UserId};
use tracing::instrument;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Parse the caller identity out of the gateway headers.
fn extract_caller(headers: &HeaderMap) -> Result<Caller, QueueError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "queue.middleware.auth", "Missing x-user-id header");
            QueueError::Unauthenticated("missing caller identity".to_string())
        })?;

    let user_id = Uuid::parse_str(user_id.trim()).map_err(|_| {
        tracing::debug!(target: "queue.middleware.auth", "Malformed x-user-id header");
        QueueError::Unauthenticated("invalid caller identity".to_string())
    })?;

    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "queue.middleware.auth", "Missing x-user-role header");
            QueueError::Unauthenticated("missing caller role".to_string())
        })?
        .trim()
        .to_ascii_lowercase()
        .parse::<Role>()
        .map_err(|e| {
            tracing::debug!(target: "queue.middleware.auth", error = %e, "Unknown caller role");
            QueueError::Unauthenticated("invalid caller role".to_string())
        })?;

    Ok(Caller {
        user_id: UserId(user_id),
        role,
    })
}

/// Identity middleware.
///
/// # Response
///
/// - Returns 401 Unauthorized if either header is missing or malformed
/// - Continues to the next handler with `Caller` in extensions otherwise
#[instrument(skip_all, name = "queue.middleware.auth")]
pub async fn require_caller(mut req: Request, next: Next) -> Result<impl IntoResponse, QueueError> {
    let caller = extract_caller(req.headers())?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(user_id: Option<&str>, role: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(id) = user_id {
            headers.insert(USER_ID_HEADER, HeaderValue::from_str(id).unwrap());
        }
        if let Some(role) = role {
            headers.insert(USER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        }
        headers
    }

    #[test]
    fn test_extract_student() {
        let id = Uuid::new_v4();
        let caller = extract_caller(&headers(Some(&id.to_string()), Some("student"))).unwrap();
        assert_eq!(caller, Caller::student(UserId(id)));
    }

    #[test]
    fn test_extract_provider_case_insensitive() {
        let id = Uuid::new_v4();
        let caller = extract_caller(&headers(Some(&id.to_string()), Some("Provider"))).unwrap();
        assert_eq!(caller.role, Role::Provider);
    }

    #[test]
    fn test_missing_user_id() {
        let err = extract_caller(&headers(None, Some("student"))).unwrap_err();
        assert!(matches!(err, QueueError::Unauthenticated(_)));
    }

    #[test]
    fn test_malformed_user_id() {
        let err = extract_caller(&headers(Some("not-a-uuid"), Some("student"))).unwrap_err();
        assert!(matches!(err, QueueError::Unauthenticated(_)));
    }

    #[test]
    fn test_missing_role() {
        let id = Uuid::new_v4().to_string();
        let err = extract_caller(&headers(Some(&id), None)).unwrap_err();
        assert!(matches!(err, QueueError::Unauthenticated(_)));
    }

    #[test]
    fn test_unknown_role() {
        let id = Uuid::new_v4().to_string();
        let err = extract_caller(&headers(Some(&id), Some("admin"))).unwrap_err();
        assert!(matches!(err, QueueError::Unauthenticated(_)));
    }
}
