//! Database fixtures and an engine wired with recording mocks.

use chrono::Duration;
use common::secret::SecretString;
use common::types::{OfficeHourId, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use queue_service::crypto::QrTokenCodec;
use queue_service::models::Caller;
use queue_service::observability::metrics::init_metrics_recorder;
use queue_service::services::audit::mock::RecordingAuditSink;
use queue_service::services::publisher::mock::RecordingPublisher;
use queue_service::services::{AuditSink, PgOfficeHourLookup, QueueEngine, QueueSettings};
use sqlx::PgPool;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// 32 bytes (0x00..=0x1f), base64 encoded.
pub const TEST_SIGNING_SECRET: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

/// A different 32-byte secret, for wrong-key tests.
pub const OTHER_SIGNING_SECRET: &str = "ICEiIyQlJicoKSorLC0uLzAxMjM0NTY3ODk6Ozw9Pj8=";

/// Codec keyed with [`TEST_SIGNING_SECRET`].
pub fn test_codec() -> QrTokenCodec {
    QrTokenCodec::from_base64_secret(&SecretString::from(TEST_SIGNING_SECRET))
        .expect("test secret should be valid")
}

/// Codec keyed with [`OTHER_SIGNING_SECRET`].
pub fn other_codec() -> QrTokenCodec {
    QrTokenCodec::from_base64_secret(&SecretString::from(OTHER_SIGNING_SECRET))
        .expect("other secret should be valid")
}

static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide metrics handle for test servers.
///
/// The global recorder can only be installed once per process; later calls
/// fall back to a detached recorder's handle.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

/// Insert an office hour owned by a fresh provider.
pub async fn seed_office_hour(pool: &PgPool) -> Result<(OfficeHourId, UserId), anyhow::Error> {
    let office_hour_id = OfficeHourId::new();
    let provider = UserId::new();

    sqlx::query("INSERT INTO office_hours (office_hour_id, provider_user_id) VALUES ($1, $2)")
        .bind(office_hour_id.0)
        .bind(provider.0)
        .execute(pool)
        .await?;

    Ok((office_hour_id, provider))
}

/// A new student caller.
pub fn new_student() -> Caller {
    Caller::student(UserId::new())
}

/// Engine settings used by the fixtures. Tests move clocks by editing rows, not by shrinking these.
pub fn test_settings() -> QueueSettings {
    QueueSettings {
        qr_ttl: Duration::seconds(15),
        qr_rotation_interval: Duration::seconds(10),
        no_show_timeout: Duration::seconds(120),
        minutes_per_student: 10,
    }
}

/// Queue engine over a real database with recording publisher and audit.
pub struct TestEngine {
    pub engine: QueueEngine,
    pub publisher: Arc<RecordingPublisher>,
    pub audit: Arc<RecordingAuditSink>,
}

impl TestEngine {
    pub fn new(pool: PgPool) -> Self {
        Self::with_settings(pool, test_settings())
    }

    pub fn with_settings(pool: PgPool, settings: QueueSettings) -> Self {
        Self::build(pool, settings, Arc::new(RecordingAuditSink::new()))
    }

    /// Engine whose audit sink fails every write.
    pub fn with_failing_audit(pool: PgPool) -> Self {
        Self::build(pool, test_settings(), Arc::new(RecordingAuditSink::failing()))
    }

    fn build(pool: PgPool, settings: QueueSettings, audit: Arc<RecordingAuditSink>) -> Self {
        let publisher = Arc::new(RecordingPublisher::new());
        let audit_sink: Arc<dyn AuditSink> = audit.clone();
        let engine = QueueEngine::new(
            pool.clone(),
            Arc::new(test_codec()),
            settings,
            publisher.clone(),
            audit_sink,
            Arc::new(PgOfficeHourLookup::new(pool)),
        );

        Self {
            engine,
            publisher,
            audit,
        }
    }
}

/// Push an entry's check-in deadline into the past.
pub async fn expire_ready_deadline(pool: &PgPool, entry_id: Uuid) -> Result<(), anyhow::Error> {
    sqlx::query(
        "UPDATE queue_entries SET ready_expires_at = NOW() - INTERVAL '1 second' WHERE entry_id = $1",
    )
    .bind(entry_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Age an entry's QR token so the next rotation pass replaces it.
pub async fn age_qr_token(pool: &PgPool, entry_id: Uuid, seconds: i64) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        UPDATE queue_qr_tokens
        SET issued_at = issued_at - make_interval(secs => $2),
            expires_at = expires_at - make_interval(secs => $2)
        WHERE entry_id = $1
        "#,
    )
    .bind(entry_id)
    .bind(seconds as f64)
    .execute(pool)
    .await?;
    Ok(())
}
