//! Office-hours queue engine.
//!
//! Owns the queue state machine. Every mutation follows the same shape:
//!
//! 1. Open a transaction and lock the session row (`SELECT ... FOR UPDATE`)
//! 2. Read the clock, validate preconditions, write
//! 3. Commit
//! 4. Record metrics and audit (best effort)
//! 5. Reload, project and publish fresh views (best effort)
//!
//! The session row lock serializes every writer of one session, including
//! the background sweeps, so "no ready/in-progress entry exists" is checked
//! and acted on atomically. Different sessions never contend.

use crate::config::Config;
use crate::crypto::QrTokenCodec;
use crate::errors::{QueueError, ALREADY_ACTIVE_MESSAGE};
use crate::models::{
    Caller, QrTokenRecord, QueueEntry, QueueSession, QueueStatus, SessionStatus, Transition,
    TransitionActor,
};
use crate::observability::metrics;
use crate::repositories::{
    QrTokensRepository, QueueEntriesRepository, QueueSessionsRepository, SweepCandidate,
};
use crate::services::audit::AuditSink;
use crate::services::office_hours::OfficeHourLookup;
use crate::services::publisher::RealtimePublisher;
use crate::services::view_projector::{
    project_provider_view, project_student_view, ProviderView, StudentView,
};
use chrono::{DateTime, Duration, Utc};
use common::types::{OfficeHourId, QueueEntryId, Role, SessionId, UserId};
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

/// Longest accepted join purpose, in characters.
pub const MAX_PURPOSE_CHARS: usize = 500;

/// The one message every rejected scan gets.
pub const INVALID_TOKEN_MESSAGE: &str = "invalid or expired token";

const JOIN_AUDIT_ACTION: &str = "queue.entry.joined";

/// Timing knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Lifetime of a single QR token.
    pub qr_ttl: Duration,
    /// Age at which a ready student's token is replaced.
    pub qr_rotation_interval: Duration,
    /// Time a ready student has to scan in.
    pub no_show_timeout: Duration,
    pub minutes_per_student: u32,
}

impl QueueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            qr_ttl: Duration::seconds(config.qr_ttl_seconds as i64),
            qr_rotation_interval: Duration::seconds(config.qr_rotation_interval_seconds as i64),
            no_show_timeout: Duration::seconds(config.no_show_timeout_seconds as i64),
            minutes_per_student: config.estimated_minutes_per_student,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            qr_ttl: Duration::seconds(15),
            qr_rotation_interval: Duration::seconds(10),
            no_show_timeout: Duration::seconds(120),
            minutes_per_student: 10,
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries changed (tokens rotated or entries timed out).
    pub items: usize,
    /// Sessions with at least one change.
    pub sessions_touched: usize,
    /// Sessions skipped because of an error.
    pub sessions_failed: usize,
}

/// Everything needed to project views for one session.
struct SessionSnapshot {
    session: QueueSession,
    active: Vec<QueueEntry>,
    current_token: Option<QrTokenRecord>,
}

/// Queue engine shared by HTTP handlers and background sweeps.
#[derive(Clone)]
pub struct QueueEngine {
    pool: PgPool,
    codec: Arc<QrTokenCodec>,
    settings: QueueSettings,
    publisher: Arc<dyn RealtimePublisher>,
    audit: Arc<dyn AuditSink>,
    office_hours: Arc<dyn OfficeHourLookup>,
}

impl QueueEngine {
    pub fn new(
        pool: PgPool,
        codec: Arc<QrTokenCodec>,
        settings: QueueSettings,
        publisher: Arc<dyn RealtimePublisher>,
        audit: Arc<dyn AuditSink>,
        office_hours: Arc<dyn OfficeHourLookup>,
    ) -> Self {
        Self {
            pool,
            codec,
            settings,
            publisher,
            audit,
            office_hours,
        }
    }

    // ------------------------------------------------------------------------
    // Student operations
    // ------------------------------------------------------------------------

    /// Join an office hour's queue.
    ///
    /// A new entry publishes both views. Re-joining while an entry is still
    /// active returns that entry unchanged and publishes nothing: no state
    /// moved, and subscribers already hold the view from the original join.
    ///
    /// # Errors
    ///
    /// - `NotFound` - office hour does not exist
    /// - `Forbidden` - caller owns the office hour
    /// - `BadRequest` - purpose too long, or the queue is closed
    #[instrument(skip_all, name = "queue.engine.join", fields(office_hour_id = %office_hour_id))]
    pub async fn join_queue(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
        purpose: Option<&str>,
    ) -> Result<StudentView, QueueError> {
        let provider = self.require_office_hour(office_hour_id).await?;
        if caller.user_id == provider {
            return Err(QueueError::Forbidden(
                "providers cannot join their own queue".to_string(),
            ));
        }

        let purpose = purpose.map(str::trim).unwrap_or_default();
        if purpose.chars().count() > MAX_PURPOSE_CHARS {
            return Err(QueueError::BadRequest(format!(
                "purpose must be at most {MAX_PURPOSE_CHARS} characters"
            )));
        }

        let mut tx = self.pool.begin().await?;
        let session =
            QueueSessionsRepository::get_or_create_locked(&mut tx, office_hour_id, provider)
                .await?;

        let existing = QueueEntriesRepository::find_active_for_student(
            &mut *tx,
            session.session_id,
            caller.user_id,
        )
        .await?;
        if let Some(existing) = existing {
            tx.commit().await?;
            tracing::debug!(
                target: "queue.engine",
                entry_id = %existing.entry_id,
                "Student already queued, returning existing entry"
            );
            return self
                .load_student_view(office_hour_id, Some(session), caller.user_id)
                .await;
        }

        if session.status == SessionStatus::Closed {
            return Err(QueueError::BadRequest("queue is closed".to_string()));
        }

        let now = Utc::now();
        let entry = QueueEntriesRepository::insert_waiting(
            &mut *tx,
            session.session_id,
            caller.user_id,
            purpose,
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            target: "queue.engine",
            office_hour_id = %office_hour_id,
            entry_id = %entry.entry_id,
            "Student joined queue"
        );
        metrics::record_transition("joined");
        self.audit_best_effort(&caller.user_id.to_string(), JOIN_AUDIT_ACTION, entry.entry_id)
            .await;

        let snapshot = self.load_snapshot(session).await?;
        self.publish_provider(&snapshot).await;
        let view = self.student_view_from(&snapshot, caller.user_id);
        self.publish_student(caller.user_id, office_hour_id, &view).await;

        Ok(view)
    }

    /// Check in by scanning the provider's QR code.
    ///
    /// Every rejection, whatever the cause, is `BadRequest("invalid or
    /// expired token")`. The actual reason is only logged at debug level.
    #[instrument(skip_all, name = "queue.engine.scan")]
    pub async fn scan_qr(&self, caller: Caller, token: &str) -> Result<StudentView, QueueError> {
        let payload = match self.codec.verify(token) {
            Ok(payload) => payload,
            Err(_) => return Err(reject_scan("signature")),
        };
        let entry_id = QueueEntryId(payload.entry_id);

        let Some(entry) = QueueEntriesRepository::find_by_id(&self.pool, entry_id).await? else {
            return Err(reject_scan("unknown entry"));
        };

        let mut tx = self.pool.begin().await?;
        let Some(session) = QueueSessionsRepository::lock(&mut *tx, entry.session_id).await? else {
            return Err(reject_scan("unknown session"));
        };
        let now = Utc::now();

        // Re-read under the lock
        let Some(entry) = QueueEntriesRepository::find_by_id(&mut *tx, entry_id).await? else {
            return Err(reject_scan("unknown entry"));
        };
        if entry.student_user_id != caller.user_id {
            return Err(reject_scan("entry belongs to another student"));
        }
        if entry.status != QueueStatus::Ready {
            return Err(reject_scan("entry not ready"));
        }

        let Some(record) = QrTokensRepository::find(&mut *tx, entry_id).await? else {
            return Err(reject_scan("no token issued"));
        };
        let Some(current_nonce) = record.current_nonce.as_deref() else {
            return Err(reject_scan("no outstanding nonce"));
        };
        if record.used_at.is_some() {
            return Err(reject_scan("token already used"));
        }
        if now >= record.expires_at {
            return Err(reject_scan("token expired"));
        }
        if payload.nonce != current_nonce {
            return Err(reject_scan("nonce mismatch"));
        }

        if !QrTokensRepository::consume(&mut *tx, entry_id, current_nonce, caller.user_id, now)
            .await?
        {
            return Err(reject_scan("token consumed concurrently"));
        }

        let actor = TransitionActor::User(caller.user_id);
        if QueueEntriesRepository::apply_transition(
            &mut *tx,
            entry_id,
            Transition::CheckedIn,
            actor,
            now,
        )
        .await?
        .is_none()
        {
            return Err(reject_scan("entry changed concurrently"));
        }
        tx.commit().await?;

        metrics::record_scan_attempt("accepted");
        tracing::info!(
            target: "queue.engine",
            office_hour_id = %session.office_hour_id,
            entry_id = %entry_id,
            "Student checked in"
        );
        self.after_transition(Transition::CheckedIn, actor, entry_id).await;

        let office_hour_id = session.office_hour_id;
        let snapshot = self.load_snapshot(session).await?;
        self.publish_provider(&snapshot).await;
        let view = self.student_view_from(&snapshot, caller.user_id);
        self.publish_student(caller.user_id, office_hour_id, &view).await;

        Ok(view)
    }

    /// The caller's own status in an office hour's queue.
    ///
    /// A student who never joined gets a view with no entry, not an error.
    #[instrument(skip_all, name = "queue.engine.student_view", fields(office_hour_id = %office_hour_id))]
    pub async fn student_view(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
    ) -> Result<StudentView, QueueError> {
        self.require_office_hour(office_hour_id).await?;
        let session =
            QueueSessionsRepository::find_by_office_hour(&self.pool, office_hour_id).await?;
        self.load_student_view(office_hour_id, session, caller.user_id)
            .await
    }

    // ------------------------------------------------------------------------
    // Provider operations
    // ------------------------------------------------------------------------

    /// The provider dashboard. Creates the session if needed.
    #[instrument(skip_all, name = "queue.engine.provider_view", fields(office_hour_id = %office_hour_id))]
    pub async fn provider_view(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
    ) -> Result<ProviderView, QueueError> {
        let provider = self.require_owner(caller, office_hour_id).await?;

        let session =
            match QueueSessionsRepository::find_by_office_hour(&self.pool, office_hour_id).await? {
                Some(session) => session,
                None => {
                    let mut tx = self.pool.begin().await?;
                    let session = QueueSessionsRepository::get_or_create_locked(
                        &mut tx,
                        office_hour_id,
                        provider,
                    )
                    .await?;
                    tx.commit().await?;
                    session
                }
            };

        let snapshot = self.load_snapshot(session).await?;
        self.provider_view_from(&snapshot)
    }

    /// Call the oldest waiting student.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `Forbidden` - unknown office hour or not the owner
    /// - `Conflict` - a student is already ready or in progress
    /// - `BadRequest` - nobody is waiting
    #[instrument(skip_all, name = "queue.engine.call_next", fields(office_hour_id = %office_hour_id))]
    pub async fn call_next(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
    ) -> Result<ProviderView, QueueError> {
        let provider = self.require_owner(caller, office_hour_id).await?;

        let mut tx = self.pool.begin().await?;
        let session =
            QueueSessionsRepository::get_or_create_locked(&mut tx, office_hour_id, provider)
                .await?;
        let now = Utc::now();

        if QueueEntriesRepository::find_current(&mut *tx, session.session_id)
            .await?
            .is_some()
        {
            return Err(QueueError::Conflict(ALREADY_ACTIVE_MESSAGE.to_string()));
        }

        let Some(next) =
            QueueEntriesRepository::find_oldest_waiting(&mut *tx, session.session_id).await?
        else {
            return Err(QueueError::BadRequest("no waiting students".to_string()));
        };

        let transition = Transition::Called {
            ready_expires_at: now + self.settings.no_show_timeout,
        };
        let actor = TransitionActor::User(caller.user_id);
        let called =
            QueueEntriesRepository::apply_transition(&mut *tx, next.entry_id, transition, actor, now)
                .await?
                .ok_or_else(|| QueueError::Conflict(ALREADY_ACTIVE_MESSAGE.to_string()))?;

        self.issue_token(&mut tx, called.entry_id, now).await?;
        tx.commit().await?;

        tracing::info!(
            target: "queue.engine",
            office_hour_id = %office_hour_id,
            entry_id = %called.entry_id,
            "Called next student"
        );
        self.after_transition(transition, actor, called.entry_id).await;

        let snapshot = self.load_snapshot(session).await?;
        let view = self.provider_view_from(&snapshot)?;
        self.publish_provider_view(office_hour_id, &view).await;
        self.publish_student(
            called.student_user_id,
            office_hour_id,
            &self.student_view_from(&snapshot, called.student_user_id),
        )
        .await;

        Ok(view)
    }

    /// Finish with the in-progress student.
    #[instrument(skip_all, name = "queue.engine.complete", fields(office_hour_id = %office_hour_id))]
    pub async fn complete_current(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
    ) -> Result<ProviderView, QueueError> {
        self.finish_current(
            caller,
            office_hour_id,
            Transition::Completed,
            "no in-progress student",
        )
        .await
    }

    /// Mark the ready student as a no-show.
    #[instrument(skip_all, name = "queue.engine.no_show", fields(office_hour_id = %office_hour_id))]
    pub async fn mark_no_show_current(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
    ) -> Result<ProviderView, QueueError> {
        self.finish_current(
            caller,
            office_hour_id,
            Transition::MarkedNoShow,
            "no ready student",
        )
        .await
    }

    async fn finish_current(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
        transition: Transition,
        missing_message: &str,
    ) -> Result<ProviderView, QueueError> {
        let provider = self.require_owner(caller, office_hour_id).await?;

        let mut tx = self.pool.begin().await?;
        let session =
            QueueSessionsRepository::get_or_create_locked(&mut tx, office_hour_id, provider)
                .await?;
        let now = Utc::now();

        let Some(entry) = QueueEntriesRepository::find_oldest_with_status(
            &mut *tx,
            session.session_id,
            transition.from_status(),
        )
        .await?
        else {
            return Err(QueueError::BadRequest(missing_message.to_string()));
        };

        let actor = TransitionActor::User(caller.user_id);
        QueueEntriesRepository::apply_transition(&mut *tx, entry.entry_id, transition, actor, now)
            .await?
            .ok_or_else(|| QueueError::BadRequest(missing_message.to_string()))?;
        tx.commit().await?;

        tracing::info!(
            target: "queue.engine",
            office_hour_id = %office_hour_id,
            entry_id = %entry.entry_id,
            transition = transition.metric_label(),
            "Finished current student"
        );
        self.after_transition(transition, actor, entry.entry_id).await;

        let snapshot = self.load_snapshot(session).await?;
        let view = self.provider_view_from(&snapshot)?;
        self.publish_provider_view(office_hour_id, &view).await;
        self.publish_student(
            entry.student_user_id,
            office_hour_id,
            &self.student_view_from(&snapshot, entry.student_user_id),
        )
        .await;

        Ok(view)
    }

    // ------------------------------------------------------------------------
    // Background sweeps
    // ------------------------------------------------------------------------

    /// Replace the QR token of every ready entry whose token is older than
    /// the rotation interval or already expired, so a leaked code stops
    /// working quickly and the dashboard never keeps showing a dead one.
    ///
    /// Failures are isolated per session.
    #[instrument(skip_all, name = "queue.engine.rotate_tokens")]
    pub async fn rotate_ready_qr_tokens(&self) -> Result<SweepReport, QueueError> {
        let now = Utc::now();
        let cutoff = now - self.settings.qr_rotation_interval;
        let candidates =
            QueueEntriesRepository::list_ready_needing_rotation(&self.pool, cutoff, now).await?;

        let mut report = SweepReport::default();
        for (session_id, entry_ids) in group_by_session(candidates) {
            match self.rotate_session(session_id, &entry_ids).await {
                Ok(0) => {}
                Ok(rotated) => {
                    report.items += rotated;
                    report.sessions_touched += 1;
                }
                Err(e) => {
                    report.sessions_failed += 1;
                    tracing::warn!(
                        target: "queue.engine.sweep",
                        session_id = %session_id,
                        error = %e,
                        "QR rotation failed for session, continuing"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn rotate_session(
        &self,
        session_id: SessionId,
        entry_ids: &[QueueEntryId],
    ) -> Result<usize, QueueError> {
        let mut tx = self.pool.begin().await?;
        let Some(session) = QueueSessionsRepository::lock(&mut *tx, session_id).await? else {
            return Ok(0);
        };
        let now = Utc::now();
        let cutoff = now - self.settings.qr_rotation_interval;

        let mut rotated = 0;
        for &entry_id in entry_ids {
            let still_ready = QueueEntriesRepository::find_by_id(&mut *tx, entry_id)
                .await?
                .is_some_and(|e| e.status == QueueStatus::Ready);
            if !still_ready {
                continue;
            }

            let due = match QrTokensRepository::find(&mut *tx, entry_id).await? {
                Some(record) => {
                    record.current_nonce.is_none()
                        || record.issued_at <= cutoff
                        || record.expires_at <= now
                }
                None => true,
            };
            if due {
                self.issue_token(&mut tx, entry_id, now).await?;
                rotated += 1;
            }
        }
        tx.commit().await?;

        if rotated > 0 {
            tracing::debug!(
                target: "queue.engine.sweep",
                session_id = %session_id,
                rotated,
                "Rotated QR tokens"
            );
            let snapshot = self.load_snapshot(session).await?;
            self.publish_provider(&snapshot).await;
        }

        Ok(rotated)
    }

    /// Move every ready entry past its check-in deadline to no-show.
    ///
    /// Failures are isolated per session.
    #[instrument(skip_all, name = "queue.engine.auto_no_show")]
    pub async fn auto_no_show_expired_ready(&self) -> Result<SweepReport, QueueError> {
        let candidates =
            QueueEntriesRepository::list_expired_ready(&self.pool, Utc::now()).await?;

        let mut report = SweepReport::default();
        for (session_id, entry_ids) in group_by_session(candidates) {
            match self.expire_session(session_id, &entry_ids).await {
                Ok(0) => {}
                Ok(expired) => {
                    report.items += expired;
                    report.sessions_touched += 1;
                }
                Err(e) => {
                    report.sessions_failed += 1;
                    tracing::warn!(
                        target: "queue.engine.sweep",
                        session_id = %session_id,
                        error = %e,
                        "Auto no-show failed for session, continuing"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn expire_session(
        &self,
        session_id: SessionId,
        entry_ids: &[QueueEntryId],
    ) -> Result<usize, QueueError> {
        let mut tx = self.pool.begin().await?;
        let Some(session) = QueueSessionsRepository::lock(&mut *tx, session_id).await? else {
            return Ok(0);
        };
        let now = Utc::now();

        let mut expired = Vec::new();
        for &entry_id in entry_ids {
            let Some(entry) = QueueEntriesRepository::find_by_id(&mut *tx, entry_id).await? else {
                continue;
            };
            let past_deadline = entry.ready_expires_at.is_some_and(|deadline| deadline <= now);
            if entry.status != QueueStatus::Ready || !past_deadline {
                continue;
            }

            if QueueEntriesRepository::apply_transition(
                &mut *tx,
                entry_id,
                Transition::TimedOut,
                TransitionActor::System,
                now,
            )
            .await?
            .is_some()
            {
                expired.push(entry);
            }
        }
        tx.commit().await?;

        if expired.is_empty() {
            return Ok(0);
        }

        let office_hour_id = session.office_hour_id;
        for entry in &expired {
            tracing::info!(
                target: "queue.engine.sweep",
                office_hour_id = %office_hour_id,
                entry_id = %entry.entry_id,
                "Ready student timed out, marked no-show"
            );
            self.after_transition(Transition::TimedOut, TransitionActor::System, entry.entry_id)
                .await;
        }

        let snapshot = self.load_snapshot(session).await?;
        self.publish_provider(&snapshot).await;
        for entry in &expired {
            let view = self.student_view_from(&snapshot, entry.student_user_id);
            self.publish_student(entry.student_user_id, office_hour_id, &view)
                .await;
        }

        Ok(expired.len())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn require_office_hour(&self, office_hour_id: OfficeHourId) -> Result<UserId, QueueError> {
        self.office_hours
            .provider_for(office_hour_id)
            .await?
            .ok_or_else(|| QueueError::NotFound("office hour not found".to_string()))
    }

    async fn require_owner(
        &self,
        caller: Caller,
        office_hour_id: OfficeHourId,
    ) -> Result<UserId, QueueError> {
        let provider = self.require_office_hour(office_hour_id).await?;
        if caller.role != Role::Provider || caller.user_id != provider {
            return Err(QueueError::Forbidden(
                "only the office hour's provider can manage its queue".to_string(),
            ));
        }
        Ok(provider)
    }

    async fn issue_token(
        &self,
        conn: &mut PgConnection,
        entry_id: QueueEntryId,
        now: DateTime<Utc>,
    ) -> Result<QrTokenRecord, QueueError> {
        let nonce = self.codec.generate_nonce()?;
        QrTokensRepository::issue(conn, entry_id, &nonce, now, now + self.settings.qr_ttl).await
    }

    async fn after_transition(
        &self,
        transition: Transition,
        actor: TransitionActor,
        entry_id: QueueEntryId,
    ) {
        metrics::record_transition(transition.metric_label());
        self.audit_best_effort(&actor.to_string(), transition.audit_action(), entry_id)
            .await;
    }

    async fn audit_best_effort(&self, actor: &str, action: &str, entry_id: QueueEntryId) {
        if let Err(e) = self.audit.log(actor, action, entry_id.0).await {
            tracing::warn!(
                target: "queue.engine.audit",
                action = action,
                entry_id = %entry_id,
                error = %e,
                "Failed to record audit event"
            );
        }
    }

    async fn load_snapshot(&self, session: QueueSession) -> Result<SessionSnapshot, QueueError> {
        let active = QueueEntriesRepository::list_active(&self.pool, session.session_id).await?;

        let current_token = match active.iter().find(|e| e.status == QueueStatus::Ready) {
            Some(ready) => QrTokensRepository::find(&self.pool, ready.entry_id).await?,
            None => None,
        };

        Ok(SessionSnapshot {
            session,
            active,
            current_token,
        })
    }

    async fn load_student_view(
        &self,
        office_hour_id: OfficeHourId,
        session: Option<QueueSession>,
        student: UserId,
    ) -> Result<StudentView, QueueError> {
        let active = match &session {
            Some(s) => QueueEntriesRepository::list_active(&self.pool, s.session_id).await?,
            None => Vec::new(),
        };

        Ok(project_student_view(
            office_hour_id,
            session.as_ref(),
            &active,
            student,
            self.settings.minutes_per_student,
            Utc::now(),
        ))
    }

    fn provider_view_from(&self, snapshot: &SessionSnapshot) -> Result<ProviderView, QueueError> {
        Ok(project_provider_view(
            &snapshot.session,
            &snapshot.active,
            snapshot.current_token.as_ref(),
            &self.codec,
            self.settings.minutes_per_student,
            Utc::now(),
        )?)
    }

    fn student_view_from(&self, snapshot: &SessionSnapshot, student: UserId) -> StudentView {
        project_student_view(
            snapshot.session.office_hour_id,
            Some(&snapshot.session),
            &snapshot.active,
            student,
            self.settings.minutes_per_student,
            Utc::now(),
        )
    }

    async fn publish_provider(&self, snapshot: &SessionSnapshot) {
        match self.provider_view_from(snapshot) {
            Ok(view) => {
                self.publish_provider_view(snapshot.session.office_hour_id, &view)
                    .await
            }
            Err(e) => tracing::warn!(
                target: "queue.engine.publish",
                office_hour_id = %snapshot.session.office_hour_id,
                error = %e,
                "Failed to build provider view for publish"
            ),
        }
    }

    async fn publish_provider_view(&self, office_hour_id: OfficeHourId, view: &ProviderView) {
        if let Err(e) = self
            .publisher
            .publish_provider_view(office_hour_id, view)
            .await
        {
            tracing::warn!(
                target: "queue.engine.publish",
                office_hour_id = %office_hour_id,
                error = %e,
                "Failed to publish provider view"
            );
        }
    }

    async fn publish_student(&self, student: UserId, office_hour_id: OfficeHourId, view: &StudentView) {
        if let Err(e) = self
            .publisher
            .publish_student_view(student, office_hour_id, view)
            .await
        {
            tracing::warn!(
                target: "queue.engine.publish",
                office_hour_id = %office_hour_id,
                error = %e,
                "Failed to publish student view"
            );
        }
    }
}

fn reject_scan(reason: &'static str) -> QueueError {
    tracing::debug!(target: "queue.engine.scan", reason, "Rejected QR scan");
    metrics::record_scan_attempt("rejected");
    QueueError::BadRequest(INVALID_TOKEN_MESSAGE.to_string())
}

/// Group sweep candidates by session, keeping entry order.
fn group_by_session(candidates: Vec<SweepCandidate>) -> BTreeMap<SessionId, Vec<QueueEntryId>> {
    let mut grouped: BTreeMap<SessionId, Vec<QueueEntryId>> = BTreeMap::new();
    for candidate in candidates {
        grouped
            .entry(SessionId(candidate.session_id))
            .or_default()
            .push(QueueEntryId(candidate.entry_id));
    }
    grouped
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[test]
    fn test_settings_default_matches_config_defaults() {
        let vars = HashMap::from([
            ("DATABASE_URL".to_string(), "postgresql://localhost/q".to_string()),
            (
                "QR_SIGNING_SECRET".to_string(),
                "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
            ),
        ]);
        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(QueueSettings::from_config(&config), QueueSettings::default());
    }

    #[test]
    fn test_settings_from_config() {
        let vars = HashMap::from([
            ("DATABASE_URL".to_string(), "postgresql://localhost/q".to_string()),
            (
                "QR_SIGNING_SECRET".to_string(),
                "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
            ),
            ("QR_TTL_SECONDS".to_string(), "5".to_string()),
            ("QR_ROTATION_INTERVAL_SECONDS".to_string(), "4".to_string()),
            ("NO_SHOW_TIMEOUT_SECONDS".to_string(), "30".to_string()),
            ("ESTIMATED_MINUTES_PER_STUDENT".to_string(), "4".to_string()),
        ]);
        let settings = QueueSettings::from_config(&Config::from_vars(&vars).unwrap());

        assert_eq!(settings.qr_ttl, Duration::seconds(5));
        assert_eq!(settings.qr_rotation_interval, Duration::seconds(4));
        assert_eq!(settings.no_show_timeout, Duration::seconds(30));
        assert_eq!(settings.minutes_per_student, 4);
    }

    #[test]
    fn test_group_by_session() {
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let e1 = Uuid::new_v4();
        let e2 = Uuid::new_v4();
        let e3 = Uuid::new_v4();

        let grouped = group_by_session(vec![
            SweepCandidate { session_id: s1, entry_id: e1 },
            SweepCandidate { session_id: s2, entry_id: e2 },
            SweepCandidate { session_id: s1, entry_id: e3 },
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&SessionId(s1)], vec![QueueEntryId(e1), QueueEntryId(e3)]);
        assert_eq!(grouped[&SessionId(s2)], vec![QueueEntryId(e2)]);
    }

    #[test]
    fn test_reject_scan_is_generic() {
        let err = reject_scan("nonce mismatch");
        assert!(matches!(&err, QueueError::BadRequest(msg) if msg == INVALID_TOKEN_MESSAGE));
        assert!(!err.to_string().contains("nonce"));
    }
}
