//! Check-in token state repository.
//!
//! One row per entry that has ever been called. Rotation overwrites the row
//! in place; a successful scan clears `current_nonce` so the token it was
//! minted from can never be accepted again.

use crate::errors::QueueError;
use crate::models::QrTokenRecord;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::types::{QueueEntryId, UserId};
use sqlx::PgExecutor;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Repository for check-in token operations.
pub struct QrTokensRepository;

impl QrTokensRepository {
    /// Issue a fresh nonce for an entry, replacing any previous one and
    /// resetting the used markers.
    #[instrument(skip_all, fields(entry_id = %entry_id))]
    pub async fn issue<'e, E: PgExecutor<'e>>(
        executor: E,
        entry_id: QueueEntryId,
        nonce: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<QrTokenRecord, QueueError> {
        let start = Instant::now();
        let result: Result<QrTokenRow, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO queue_qr_tokens (entry_id, current_nonce, issued_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (entry_id) DO UPDATE SET
                current_nonce = EXCLUDED.current_nonce,
                issued_at = EXCLUDED.issued_at,
                expires_at = EXCLUDED.expires_at,
                used_at = NULL,
                used_by = NULL
            RETURNING entry_id, current_nonce, issued_at, expires_at, used_at, used_by
            "#,
        )
        .bind(entry_id.0)
        .bind(nonce)
        .bind(issued_at)
        .bind(expires_at)
        .fetch_one(executor)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("issue_qr_token", status, start.elapsed());

        Ok(result?.into())
    }

    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        entry_id: QueueEntryId,
    ) -> Result<Option<QrTokenRecord>, QueueError> {
        let row: Option<QrTokenRow> = sqlx::query_as(
            r#"
            SELECT entry_id, current_nonce, issued_at, expires_at, used_at, used_by
            FROM queue_qr_tokens
            WHERE entry_id = $1
            "#,
        )
        .bind(entry_id.0)
        .fetch_optional(executor)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Mark the outstanding nonce used and clear it.
    ///
    /// Only succeeds if `nonce` is still the outstanding, unused nonce.
    /// Returns whether a row was consumed.
    #[instrument(skip_all, fields(entry_id = %entry_id))]
    pub async fn consume<'e, E: PgExecutor<'e>>(
        executor: E,
        entry_id: QueueEntryId,
        nonce: &str,
        used_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE queue_qr_tokens
            SET used_at = $4, used_by = $3, current_nonce = NULL
            WHERE entry_id = $1 AND current_nonce = $2 AND used_at IS NULL
            "#,
        )
        .bind(entry_id.0)
        .bind(nonce)
        .bind(used_by.0)
        .bind(now)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct QrTokenRow {
    entry_id: Uuid,
    current_nonce: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    used_by: Option<Uuid>,
}

impl From<QrTokenRow> for QrTokenRecord {
    fn from(row: QrTokenRow) -> Self {
        QrTokenRecord {
            entry_id: QueueEntryId(row.entry_id),
            current_nonce: row.current_nonce,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            used_at: row.used_at,
            used_by: row.used_by.map(UserId),
        }
    }
}
