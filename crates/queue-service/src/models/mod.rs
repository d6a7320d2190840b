//! Queue service models.
//!
//! Domain types shared by repositories, the engine and the HTTP layer.

use chrono::{DateTime, Utc};
use common::types::{OfficeHourId, QueueEntryId, Role, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a queue entry.
///
/// `Waiting -> Ready -> InProgress -> Done`, with `Ready -> NoShow` as the
/// only other exit. `Done` and `NoShow` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Ready,
    InProgress,
    Done,
    NoShow,
}

impl QueueStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Ready => "ready",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Done => "done",
            QueueStatus::NoShow => "no_show",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(QueueStatus::Waiting),
            "ready" => Some(QueueStatus::Ready),
            "in_progress" => Some(QueueStatus::InProgress),
            "done" => Some(QueueStatus::Done),
            "no_show" => Some(QueueStatus::NoShow),
            _ => None,
        }
    }

    /// Entries in these states hold a place in the queue.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            QueueStatus::Waiting | QueueStatus::Ready | QueueStatus::InProgress
        )
    }

    /// Ready or in progress: the session's single service slot.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, QueueStatus::Ready | QueueStatus::InProgress)
    }

    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Waiting, QueueStatus::Ready)
                | (QueueStatus::Ready, QueueStatus::InProgress)
                | (QueueStatus::Ready, QueueStatus::NoShow)
                | (QueueStatus::InProgress, QueueStatus::Done)
        )
    }
}

/// Session status. Closing is driven by the office hour itself, not by the
/// queue, but a closed session refuses new joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "closed" => Some(SessionStatus::Closed),
            _ => None,
        }
    }
}

/// Queue session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSession {
    pub session_id: SessionId,
    pub office_hour_id: OfficeHourId,
    pub provider_user_id: UserId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Queue entry record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub entry_id: QueueEntryId,
    pub session_id: SessionId,
    pub student_user_id: UserId,
    pub purpose: String,
    pub status: QueueStatus,
    pub enqueued_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub in_progress_at: Option<DateTime<Utc>>,
    pub done_at: Option<DateTime<Utc>>,
    pub no_show_at: Option<DateTime<Utc>>,
    pub ready_expires_at: Option<DateTime<Utc>>,
    pub last_actor: Option<String>,
    pub last_transition_at: Option<DateTime<Utc>>,
}

/// Check-in token state for one entry.
///
/// `current_nonce` is `Some` only while a token is outstanding. It is cleared
/// on a successful scan so the same token can never be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrTokenRecord {
    pub entry_id: QueueEntryId,
    pub current_nonce: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<UserId>,
}

/// Authenticated caller as asserted by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn student(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Student,
        }
    }

    pub fn provider(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Provider,
        }
    }
}

/// Who caused a transition. Recorded in `last_actor` and the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionActor {
    User(UserId),
    System,
}

impl fmt::Display for TransitionActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionActor::User(id) => write!(f, "{id}"),
            TransitionActor::System => f.write_str("system"),
        }
    }
}

/// Every state change a queue entry can go through.
///
/// Matched exhaustively wherever a transition drives a side effect, so a new
/// kind of transition cannot be added without deciding its audit action and
/// metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Provider called the next student.
    Called { ready_expires_at: DateTime<Utc> },
    /// Student scanned a valid token.
    CheckedIn,
    /// Provider finished with the student.
    Completed,
    /// Provider gave up on a ready student.
    MarkedNoShow,
    /// Ready deadline passed without a scan.
    TimedOut,
}

impl Transition {
    pub fn from_status(&self) -> QueueStatus {
        match self {
            Transition::Called { .. } => QueueStatus::Waiting,
            Transition::CheckedIn | Transition::MarkedNoShow | Transition::TimedOut => {
                QueueStatus::Ready
            }
            Transition::Completed => QueueStatus::InProgress,
        }
    }

    pub fn to_status(&self) -> QueueStatus {
        match self {
            Transition::Called { .. } => QueueStatus::Ready,
            Transition::CheckedIn => QueueStatus::InProgress,
            Transition::Completed => QueueStatus::Done,
            Transition::MarkedNoShow | Transition::TimedOut => QueueStatus::NoShow,
        }
    }

    pub fn audit_action(&self) -> &'static str {
        match self {
            Transition::Called { .. } => "queue.entry.called",
            Transition::CheckedIn => "queue.entry.checked_in",
            Transition::Completed => "queue.entry.completed",
            Transition::MarkedNoShow => "queue.entry.no_show",
            Transition::TimedOut => "queue.entry.no_show_timeout",
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            Transition::Called { .. } => "called",
            Transition::CheckedIn => "checked_in",
            Transition::Completed => "completed",
            Transition::MarkedNoShow => "marked_no_show",
            Transition::TimedOut => "timed_out",
        }
    }

    /// Deadline to store in `ready_expires_at`, if this transition sets one.
    pub fn ready_expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Transition::Called { ready_expires_at } => Some(*ready_expires_at),
            Transition::CheckedIn
            | Transition::Completed
            | Transition::MarkedNoShow
            | Transition::TimedOut => None,
        }
    }
}

/// Body of `POST /api/v1/office-hours/{id}/queue/join`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinQueueRequest {
    #[serde(default)]
    pub purpose: Option<String>,
}

/// Body of `POST /api/v1/queue/scan`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanQrRequest {
    pub token: String,
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
