//! Queue entries repository.
//!
//! Callers mutating entries must already hold the owning session's row lock
//! (see [`QueueSessionsRepository`](super::QueueSessionsRepository)).
//! Transition updates are additionally guarded on the expected source status,
//! so a stale caller updates nothing instead of corrupting state.

use crate::errors::QueueError;
use crate::models::{QueueEntry, QueueStatus, Transition, TransitionActor};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::types::{QueueEntryId, SessionId, UserId};
use sqlx::PgExecutor;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

macro_rules! entry_columns {
    () => {
        r#"entry_id, session_id, student_user_id, purpose, status, enqueued_at,
           ready_at, in_progress_at, done_at, no_show_at, ready_expires_at,
           last_actor, last_transition_at"#
    };
}

/// An entry a background sweep should look at, with the session to lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct SweepCandidate {
    pub session_id: Uuid,
    pub entry_id: Uuid,
}

/// Repository for queue entry operations.
pub struct QueueEntriesRepository;

impl QueueEntriesRepository {
    /// The student's active (waiting, ready or in progress) entry, if any.
    pub async fn find_active_for_student<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
        student_user_id: UserId,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let row: Option<QueueEntryRow> = sqlx::query_as(concat!(
            "SELECT ",
            entry_columns!(),
            r#"
            FROM queue_entries
            WHERE session_id = $1 AND student_user_id = $2 AND is_active
            "#
        ))
        .bind(session_id.0)
        .bind(student_user_id.0)
        .fetch_optional(executor)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Insert a new waiting entry.
    ///
    /// A concurrent join by the same student trips the one-active-per-student
    /// index and surfaces as `QueueError::Conflict`.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn insert_waiting<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
        student_user_id: UserId,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry, QueueError> {
        let start = Instant::now();
        let result: Result<QueueEntryRow, sqlx::Error> = sqlx::query_as(concat!(
            r#"
            INSERT INTO queue_entries (
                entry_id, session_id, student_user_id, purpose, status, is_active, enqueued_at
            )
            VALUES ($1, $2, $3, $4, 'waiting', TRUE, $5)
            RETURNING "#,
            entry_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(session_id.0)
        .bind(student_user_id.0)
        .bind(purpose)
        .bind(now)
        .fetch_one(executor)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("insert_entry", status, start.elapsed());

        result?.try_into()
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        entry_id: QueueEntryId,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let row: Option<QueueEntryRow> = sqlx::query_as(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM queue_entries WHERE entry_id = $1"
        ))
        .bind(entry_id.0)
        .fetch_optional(executor)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// The session's ready or in-progress entry, if any.
    pub async fn find_current<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let row: Option<QueueEntryRow> = sqlx::query_as(concat!(
            "SELECT ",
            entry_columns!(),
            r#"
            FROM queue_entries
            WHERE session_id = $1 AND status IN ('ready', 'in_progress')
            ORDER BY ready_at, entry_id
            LIMIT 1
            "#
        ))
        .bind(session_id.0)
        .fetch_optional(executor)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Oldest waiting entry. Ties on `enqueued_at` break on `entry_id`.
    pub async fn find_oldest_waiting<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let row: Option<QueueEntryRow> = sqlx::query_as(concat!(
            "SELECT ",
            entry_columns!(),
            r#"
            FROM queue_entries
            WHERE session_id = $1 AND status = 'waiting'
            ORDER BY enqueued_at, entry_id
            LIMIT 1
            "#
        ))
        .bind(session_id.0)
        .fetch_optional(executor)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Oldest entry in `status`, ordered by the time it entered that status.
    pub async fn find_oldest_with_status<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
        status: QueueStatus,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let row: Option<QueueEntryRow> = sqlx::query_as(concat!(
            "SELECT ",
            entry_columns!(),
            r#"
            FROM queue_entries
            WHERE session_id = $1 AND status = $2
            ORDER BY
                CASE $2
                    WHEN 'in_progress' THEN in_progress_at
                    WHEN 'ready' THEN ready_at
                    ELSE enqueued_at
                END,
                entry_id
            LIMIT 1
            "#
        ))
        .bind(session_id.0)
        .bind(status.as_db_str())
        .fetch_optional(executor)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// All active entries, oldest enqueued first.
    pub async fn list_active<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: SessionId,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let rows: Vec<QueueEntryRow> = sqlx::query_as(concat!(
            "SELECT ",
            entry_columns!(),
            r#"
            FROM queue_entries
            WHERE session_id = $1 AND is_active
            ORDER BY enqueued_at, entry_id
            "#
        ))
        .bind(session_id.0)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Apply a transition if the entry is still in the transition's source
    /// status.
    ///
    /// Sets the timestamp matching the target status, `is_active`, the
    /// last-transition actor and time, and `ready_expires_at` when the
    /// transition carries one. Returns `None` if the entry was not in the
    /// expected status.
    #[instrument(skip_all, fields(entry_id = %entry_id, transition = transition.metric_label()))]
    pub async fn apply_transition<'e, E: PgExecutor<'e>>(
        executor: E,
        entry_id: QueueEntryId,
        transition: Transition,
        actor: TransitionActor,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let start = Instant::now();
        let to = transition.to_status();

        let result: Result<Option<QueueEntryRow>, sqlx::Error> = sqlx::query_as(concat!(
            r#"
            UPDATE queue_entries SET
                status = $3,
                is_active = $4,
                ready_at = CASE WHEN $3 = 'ready' THEN $5 ELSE ready_at END,
                in_progress_at = CASE WHEN $3 = 'in_progress' THEN $5 ELSE in_progress_at END,
                done_at = CASE WHEN $3 = 'done' THEN $5 ELSE done_at END,
                no_show_at = CASE WHEN $3 = 'no_show' THEN $5 ELSE no_show_at END,
                ready_expires_at = COALESCE($6, ready_expires_at),
                last_actor = $7,
                last_transition_at = $5
            WHERE entry_id = $1 AND status = $2
            RETURNING "#,
            entry_columns!()
        ))
        .bind(entry_id.0)
        .bind(transition.from_status().as_db_str())
        .bind(to.as_db_str())
        .bind(to.is_active())
        .bind(now)
        .bind(transition.ready_expires_at())
        .bind(actor.to_string())
        .fetch_optional(executor)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("apply_transition", status, start.elapsed());

        result?.map(TryInto::try_into).transpose()
    }

    /// Ready entries whose token is due for rotation: issued at or before
    /// `issued_before`, already expired at `now`, or with no outstanding
    /// nonce at all.
    pub async fn list_ready_needing_rotation<'e, E: PgExecutor<'e>>(
        executor: E,
        issued_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SweepCandidate>, QueueError> {
        let rows = sqlx::query_as(
            r#"
            SELECT e.session_id, e.entry_id
            FROM queue_entries e
            LEFT JOIN queue_qr_tokens t ON t.entry_id = e.entry_id
            WHERE e.status = 'ready'
              AND (t.entry_id IS NULL
                   OR t.current_nonce IS NULL
                   OR t.issued_at <= $1
                   OR t.expires_at <= $2)
            ORDER BY e.session_id, e.entry_id
            "#,
        )
        .bind(issued_before)
        .bind(now)
        .fetch_all(executor)
        .await?;

        Ok(rows)
    }

    /// Ready entries whose check-in deadline is at or before `now`.
    pub async fn list_expired_ready<'e, E: PgExecutor<'e>>(
        executor: E,
        now: DateTime<Utc>,
    ) -> Result<Vec<SweepCandidate>, QueueError> {
        let rows = sqlx::query_as(
            r#"
            SELECT session_id, entry_id
            FROM queue_entries
            WHERE status = 'ready' AND ready_expires_at <= $1
            ORDER BY session_id, entry_id
            "#,
        )
        .bind(now)
        .fetch_all(executor)
        .await?;

        Ok(rows)
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct QueueEntryRow {
    entry_id: Uuid,
    session_id: Uuid,
    student_user_id: Uuid,
    purpose: String,
    status: String,
    enqueued_at: DateTime<Utc>,
    ready_at: Option<DateTime<Utc>>,
    in_progress_at: Option<DateTime<Utc>>,
    done_at: Option<DateTime<Utc>>,
    no_show_at: Option<DateTime<Utc>>,
    ready_expires_at: Option<DateTime<Utc>>,
    last_actor: Option<String>,
    last_transition_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueEntryRow> for QueueEntry {
    type Error = QueueError;

    fn try_from(row: QueueEntryRow) -> Result<Self, Self::Error> {
        let status = QueueStatus::from_db_str(&row.status).ok_or_else(|| {
            QueueError::Internal(format!("unknown queue entry status '{}'", row.status))
        })?;

        Ok(QueueEntry {
            entry_id: QueueEntryId(row.entry_id),
            session_id: SessionId(row.session_id),
            student_user_id: UserId(row.student_user_id),
            purpose: row.purpose,
            status,
            enqueued_at: row.enqueued_at,
            ready_at: row.ready_at,
            in_progress_at: row.in_progress_at,
            done_at: row.done_at,
            no_show_at: row.no_show_at,
            ready_expires_at: row.ready_expires_at,
            last_actor: row.last_actor,
            last_transition_at: row.last_transition_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row(status: &str) -> QueueEntryRow {
        QueueEntryRow {
            entry_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            student_user_id: Uuid::new_v4(),
            purpose: "homework 3".to_string(),
            status: status.to_string(),
            enqueued_at: Utc::now(),
            ready_at: None,
            in_progress_at: None,
            done_at: None,
            no_show_at: None,
            ready_expires_at: None,
            last_actor: None,
            last_transition_at: None,
        }
    }

    #[test]
    fn test_row_conversion_parses_status() {
        let entry: QueueEntry = row("in_progress").try_into().unwrap();
        assert_eq!(entry.status, QueueStatus::InProgress);
        assert_eq!(entry.purpose, "homework 3");
    }

    #[test]
    fn test_row_with_unknown_status_is_internal_error() {
        let result: Result<QueueEntry, _> = row("cancelled").try_into();
        assert!(matches!(result, Err(QueueError::Internal(_))));
    }
}
