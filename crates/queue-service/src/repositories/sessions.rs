//! Queue sessions repository.
//!
//! A session is created lazily the first time anyone touches an office
//! hour's queue. Its row doubles as the per-session lock: every mutation of
//! the session's entries first takes `SELECT ... FOR UPDATE` on it.

use crate::errors::QueueError;
use crate::models::{QueueSession, SessionStatus};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::types::{OfficeHourId, SessionId, UserId};
use sqlx::{PgConnection, PgExecutor};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Repository for queue session operations.
pub struct QueueSessionsRepository;

impl QueueSessionsRepository {
    /// Create the session for an office hour if it does not exist yet, then
    /// lock and return it.
    ///
    /// Concurrent first joins race on the `office_hour_id` unique constraint;
    /// `ON CONFLICT DO NOTHING` lets the loser fall through to the select.
    #[instrument(skip_all, fields(office_hour_id = %office_hour_id))]
    pub async fn get_or_create_locked(
        conn: &mut PgConnection,
        office_hour_id: OfficeHourId,
        provider_user_id: UserId,
    ) -> Result<QueueSession, QueueError> {
        sqlx::query(
            r#"
            INSERT INTO queue_sessions (session_id, office_hour_id, provider_user_id, status)
            VALUES ($1, $2, $3, 'active')
            ON CONFLICT (office_hour_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(office_hour_id.0)
        .bind(provider_user_id.0)
        .execute(&mut *conn)
        .await?;

        let start = Instant::now();
        let result: Result<QueueSessionRow, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT session_id, office_hour_id, provider_user_id, status, created_at
            FROM queue_sessions
            WHERE office_hour_id = $1
            FOR UPDATE
            "#,
        )
        .bind(office_hour_id.0)
        .fetch_one(&mut *conn)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("lock_session", status, start.elapsed());

        result?.try_into()
    }

    /// Lock an existing session by id.
    ///
    /// Returns `None` if the session does not exist.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn lock<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
    ) -> Result<Option<QueueSession>, QueueError> {
        let start = Instant::now();
        let result: Result<Option<QueueSessionRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT session_id, office_hour_id, provider_user_id, status, created_at
            FROM queue_sessions
            WHERE session_id = $1
            FOR UPDATE
            "#,
        )
        .bind(session_id.0)
        .fetch_optional(executor)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("lock_session", status, start.elapsed());

        result?.map(TryInto::try_into).transpose()
    }

    /// Look up an office hour's session without creating it.
    pub async fn find_by_office_hour<'e, E: PgExecutor<'e>>(
        executor: E,
        office_hour_id: OfficeHourId,
    ) -> Result<Option<QueueSession>, QueueError> {
        let row: Option<QueueSessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, office_hour_id, provider_user_id, status, created_at
            FROM queue_sessions
            WHERE office_hour_id = $1
            "#,
        )
        .bind(office_hour_id.0)
        .fetch_optional(executor)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Set a session's status. Used when an office hour is closed by its owner.
    pub async fn set_status<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<bool, QueueError> {
        let result = sqlx::query("UPDATE queue_sessions SET status = $2 WHERE session_id = $1")
            .bind(session_id.0)
            .bind(status.as_db_str())
            .execute(executor)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct QueueSessionRow {
    session_id: Uuid,
    office_hour_id: Uuid,
    provider_user_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<QueueSessionRow> for QueueSession {
    type Error = QueueError;

    fn try_from(row: QueueSessionRow) -> Result<Self, Self::Error> {
        let status = SessionStatus::from_db_str(&row.status).ok_or_else(|| {
            QueueError::Internal(format!("unknown session status '{}'", row.status))
        })?;

        Ok(QueueSession {
            session_id: SessionId(row.session_id),
            office_hour_id: OfficeHourId(row.office_hour_id),
            provider_user_id: UserId(row.provider_user_id),
            status,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row(status: &str) -> QueueSessionRow {
        QueueSessionRow {
            session_id: Uuid::new_v4(),
            office_hour_id: Uuid::new_v4(),
            provider_user_id: Uuid::new_v4(),
            status: status.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let r = row("closed");
        let office_hour_id = r.office_hour_id;
        let session: QueueSession = r.try_into().unwrap();

        assert_eq!(session.status, SessionStatus::Closed);
        assert_eq!(session.office_hour_id, OfficeHourId(office_hour_id));
    }

    #[test]
    fn test_row_with_unknown_status_is_internal_error() {
        let result: Result<QueueSession, _> = row("archived").try_into();
        assert!(matches!(result, Err(QueueError::Internal(_))));
    }
}
