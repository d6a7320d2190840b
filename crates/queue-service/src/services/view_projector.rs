//! Provider and student views of a queue session.
//!
//! Projection is pure: the engine loads rows and hands them in, which keeps
//! position and wait-time rules testable without a database.
//!
//! Positions run over the active ordering. Waiting and ready entries are
//! numbered from 1 and count ahead of everyone enqueued after them. An
//! in-progress student is already being seen, so it has no position and
//! nobody waits behind it: B moves from 2 to 1 when A checks in, not when A
//! is called.

use crate::crypto::{CodecError, QrTokenCodec, QrTokenPayload};
use crate::models::{QrTokenRecord, QueueEntry, QueueSession, QueueStatus, SessionStatus};
use chrono::{DateTime, Utc};
use common::types::{OfficeHourId, QueueEntryId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// One active entry as the provider sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemView {
    pub entry_id: QueueEntryId,
    pub student_user_id: UserId,
    pub purpose: String,
    pub status: QueueStatus,
    pub enqueued_at: DateTime<Utc>,
    /// 1-based place in line. `None` once the student is in progress.
    pub position: Option<u32>,
    pub estimated_wait_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_expires_at: Option<DateTime<Utc>>,
}

/// Provider dashboard snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderView {
    pub session_id: SessionId,
    pub office_hour_id: OfficeHourId,
    pub provider_user_id: UserId,
    pub session_status: SessionStatus,
    pub server_time: DateTime<Utc>,
    pub queue: Vec<QueueItemView>,
    pub current: Option<QueueItemView>,
    pub qr_token: Option<String>,
    pub qr_expires_at: Option<DateTime<Utc>>,
}

/// The calling student's own ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentEntryView {
    pub entry_id: QueueEntryId,
    pub status: QueueStatus,
    pub position: Option<u32>,
    pub estimated_wait_minutes: Option<u32>,
    /// Check-in deadline, present only while the entry is ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_expires_at: Option<DateTime<Utc>>,
}

/// Student status snapshot. `entry` is `None` when the student is not queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentView {
    pub session_id: Option<SessionId>,
    pub office_hour_id: OfficeHourId,
    pub server_time: DateTime<Utc>,
    pub entry: Option<StudentEntryView>,
}

/// Position and wait estimate for every active entry, in the order given
/// (oldest enqueued first).
fn annotate(active: &[QueueEntry], minutes_per_student: u32) -> Vec<(Option<u32>, Option<u32>)> {
    let mut next_position = 1u32;
    active
        .iter()
        .map(|entry| {
            if entry.status != QueueStatus::InProgress {
                let position = next_position;
                next_position = next_position.saturating_add(1);
                let eta = (position - 1).saturating_mul(minutes_per_student);
                (Some(position), Some(eta))
            } else {
                (None, None)
            }
        })
        .collect()
}

fn ready_deadline(entry: &QueueEntry) -> Option<DateTime<Utc>> {
    if entry.status == QueueStatus::Ready {
        entry.ready_expires_at
    } else {
        None
    }
}

/// Build the provider view.
///
/// `active` must be the session's active entries ordered oldest enqueued
/// first. `current_token` is the token row of the current entry, if any. A
/// token is signed fresh on every call, and only while the current entry is
/// ready with an outstanding nonce.
pub fn project_provider_view(
    session: &QueueSession,
    active: &[QueueEntry],
    current_token: Option<&QrTokenRecord>,
    codec: &QrTokenCodec,
    minutes_per_student: u32,
    now: DateTime<Utc>,
) -> Result<ProviderView, CodecError> {
    let queue: Vec<QueueItemView> = active
        .iter()
        .zip(annotate(active, minutes_per_student))
        .map(|(entry, (position, estimated_wait_minutes))| QueueItemView {
            entry_id: entry.entry_id,
            student_user_id: entry.student_user_id,
            purpose: entry.purpose.clone(),
            status: entry.status,
            enqueued_at: entry.enqueued_at,
            position,
            estimated_wait_minutes,
            ready_expires_at: ready_deadline(entry),
        })
        .collect();

    let current = queue
        .iter()
        .find(|item| item.status.occupies_slot())
        .cloned();

    let live_token = match (&current, current_token) {
        (Some(item), Some(token))
            if item.status == QueueStatus::Ready
                && token.entry_id == item.entry_id
                && token.used_at.is_none() =>
        {
            token.current_nonce.as_ref().map(|nonce| (item.entry_id, nonce, token.expires_at))
        }
        _ => None,
    };

    let (qr_token, qr_expires_at) = match live_token {
        Some((entry_id, nonce, expires_at)) => {
            let signed = codec.sign(&QrTokenPayload {
                entry_id: entry_id.0,
                nonce: nonce.clone(),
                expires_at: expires_at.timestamp(),
            })?;
            (Some(signed), Some(expires_at))
        }
        None => (None, None),
    };

    Ok(ProviderView {
        session_id: session.session_id,
        office_hour_id: session.office_hour_id,
        provider_user_id: session.provider_user_id,
        session_status: session.status,
        server_time: now,
        queue,
        current,
        qr_token,
        qr_expires_at,
    })
}

/// Build a student's view of their own ticket.
///
/// `session` is `None` if nobody has queued for the office hour yet.
pub fn project_student_view(
    office_hour_id: OfficeHourId,
    session: Option<&QueueSession>,
    active: &[QueueEntry],
    student_user_id: UserId,
    minutes_per_student: u32,
    now: DateTime<Utc>,
) -> StudentView {
    let entry = active
        .iter()
        .zip(annotate(active, minutes_per_student))
        .find(|(entry, _)| entry.student_user_id == student_user_id)
        .map(|(entry, (position, estimated_wait_minutes))| StudentEntryView {
            entry_id: entry.entry_id,
            status: entry.status,
            position,
            estimated_wait_minutes,
            ready_expires_at: ready_deadline(entry),
        });

    StudentView {
        session_id: session.map(|s| s.session_id),
        office_hour_id,
        server_time: now,
        entry,
    }
}
