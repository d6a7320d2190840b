//! Queue audit log repository.

use crate::errors::QueueError;
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

/// One recorded queue action.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub struct AuditEventsRepository;

impl AuditEventsRepository {
    /// Record an audit event.
    pub async fn insert_event<'e, E: PgExecutor<'e>>(
        executor: E,
        actor: &str,
        action: &str,
        entity_id: Uuid,
    ) -> Result<AuditEvent, QueueError> {
        let event = sqlx::query_as::<_, AuditEvent>(
            r#"
            INSERT INTO queue_audit_events (event_id, actor, action, entity_id)
            VALUES ($1, $2, $3, $4)
            RETURNING event_id, actor, action, entity_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor)
        .bind(action)
        .bind(entity_id)
        .fetch_one(executor)
        .await
        .map_err(|e| QueueError::Database(format!("Failed to record audit event: {}", e)))?;

        Ok(event)
    }

    /// Audit trail for one entity, oldest first.
    pub async fn list_for_entity<'e, E: PgExecutor<'e>>(
        executor: E,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>, QueueError> {
        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT event_id, actor, action, entity_id, created_at
            FROM queue_audit_events
            WHERE entity_id = $1
            ORDER BY created_at, event_id
            "#,
        )
        .bind(entity_id)
        .fetch_all(executor)
        .await
        .map_err(|e| QueueError::Database(format!("Failed to fetch audit events: {}", e)))?;

        Ok(events)
    }
}
