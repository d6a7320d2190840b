//! Best-effort audit trail of queue actions.
//!
//! Audit writes happen after the queue transaction commits. A failed write
//! is logged by the engine and never undoes or fails the queue change.

use crate::errors::QueueError;
use crate::repositories::AuditEventsRepository;
use sqlx::PgPool;
use uuid::Uuid;

/// Audit sink (enables mocking).
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Record that `actor` performed `action` on `entity_id`.
    async fn log(&self, actor: &str, action: &str, entity_id: Uuid) -> Result<(), QueueError>;
}

/// Writes audit events to `queue_audit_events`.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditSink for PgAuditSink {
    async fn log(&self, actor: &str, action: &str, entity_id: Uuid) -> Result<(), QueueError> {
        AuditEventsRepository::insert_event(&self.pool, actor, action, entity_id).await?;
        Ok(())
    }
}

/// Mock audit sink module for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedAudit {
        pub actor: String,
        pub action: String,
        pub entity_id: Uuid,
    }

    /// Audit sink that keeps events in memory, optionally failing every call.
    #[derive(Default)]
    pub struct RecordingAuditSink {
        events: Mutex<Vec<RecordedAudit>>,
        fail: bool,
    }

    impl RecordingAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn events(&self) -> Vec<RecordedAudit> {
            self.events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }

        pub fn actions(&self) -> Vec<String> {
            self.events().into_iter().map(|e| e.action).collect()
        }
    }

    #[async_trait::async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn log(&self, actor: &str, action: &str, entity_id: Uuid) -> Result<(), QueueError> {
            if self.fail {
                return Err(QueueError::Database("mock audit failure".to_string()));
            }
            self.events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(RecordedAudit {
                    actor: actor.to_string(),
                    action: action.to_string(),
                    entity_id,
                });
            Ok(())
        }
    }
}
