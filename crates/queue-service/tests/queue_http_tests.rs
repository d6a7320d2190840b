//! HTTP integration tests for the queue endpoints.
//!
//! Runs the walkthrough through the real router with `TestQueueServer`,
//! checking status codes and the `{ "error": { "code", "message" } }` body.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use common::types::UserId;
use queue_service::models::Caller;
use queue_service::services::{ProviderView, StudentView};
use queue_test_utils::{new_student, TestQueueServer};
use serde_json::{json, Value};
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_walkthrough_over_http(pool: PgPool) -> Result<()> {
    let server = TestQueueServer::spawn(pool).await?;
    let (office_hour_id, provider) = server.seed_office_hour().await?;
    let provider = Caller::provider(provider);
    let base = format!("/api/v1/office-hours/{office_hour_id}/queue");
    let a = new_student();
    let b = new_student();

    let response = server
        .post_as(a, &format!("{base}/join"))
        .json(&json!({ "purpose": "recursion" }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let a_view: StudentView = response.json().await?;
    assert_eq!(a_view.entry.unwrap().position, Some(1));

    // Body is optional
    let response = server.post_as(b, &format!("{base}/join")).send().await?;
    assert_eq!(response.status(), 200);

    let response = server.post_as(provider, &format!("{base}/call-next")).send().await?;
    assert_eq!(response.status(), 200);
    let view: ProviderView = response.json().await?;
    let token = view.qr_token.unwrap();

    let response = server
        .post_as(a, "/api/v1/queue/scan")
        .json(&json!({ "token": token }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let response = server.get_as(b, &format!("{base}/me")).send().await?;
    let b_view: StudentView = response.json().await?;
    let b_entry = b_view.entry.unwrap();
    assert_eq!(b_entry.position, Some(1));
    assert_eq!(b_entry.estimated_wait_minutes, Some(0));

    let response = server.post_as(provider, &format!("{base}/complete")).send().await?;
    assert_eq!(response.status(), 200);

    let response = server.get_as(provider, &base).send().await?;
    assert_eq!(response.status(), 200);
    let view: ProviderView = response.json().await?;
    assert!(view.current.is_none());
    assert_eq!(view.queue.len(), 1);

    // Replay of the consumed token
    let response = server
        .post_as(a, "/api/v1/queue/scan")
        .json(&json!({ "token": token }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(body["error"]["message"], "invalid or expired token");

    // Every step was pushed to the provider
    assert!(server.publisher().provider_views().len() >= 4);

    // And audited in Postgres
    let audited: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_audit_events")
        .fetch_one(server.pool())
        .await?;
    assert_eq!(audited, 5);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_error_status_codes(pool: PgPool) -> Result<()> {
    let server = TestQueueServer::spawn(pool).await?;
    let (office_hour_id, provider) = server.seed_office_hour().await?;
    let provider = Caller::provider(provider);
    let base = format!("/api/v1/office-hours/{office_hour_id}/queue");

    // 400: nobody waiting
    let response = server.post_as(provider, &format!("{base}/call-next")).send().await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["message"], "no waiting students");

    // 403: not the owner
    let response = server
        .post_as(new_student(), &format!("{base}/call-next"))
        .send()
        .await?;
    assert_eq!(response.status(), 403);
    let response = server
        .get_as(Caller::provider(UserId::new()), &base)
        .send()
        .await?;
    assert_eq!(response.status(), 403);

    // 404: unknown office hour
    let response = server
        .post_as(
            new_student(),
            &format!("/api/v1/office-hours/{}/queue/join", uuid::Uuid::new_v4()),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    // 400: malformed office hour id
    let response = server
        .post_as(new_student(), "/api/v1/office-hours/not-a-uuid/queue/join")
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    // 409: slot already taken
    server.post_as(new_student(), &format!("{base}/join")).send().await?;
    server.post_as(new_student(), &format!("{base}/join")).send().await?;
    let response = server.post_as(provider, &format!("{base}/call-next")).send().await?;
    assert_eq!(response.status(), 200);
    let response = server.post_as(provider, &format!("{base}/call-next")).send().await?;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "CONFLICT");

    // 400: scan with garbage
    let response = server
        .post_as(new_student(), "/api/v1/queue/scan")
        .json(&json!({ "token": "garbage" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_me_before_joining(pool: PgPool) -> Result<()> {
    let server = TestQueueServer::spawn(pool).await?;
    let (office_hour_id, _) = server.seed_office_hour().await?;

    let response = server
        .get_as(
            new_student(),
            &format!("/api/v1/office-hours/{office_hour_id}/queue/me"),
        )
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let view: StudentView = response.json().await?;
    assert!(view.entry.is_none());
    assert_eq!(view.office_hour_id, office_hour_id);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_server_driven_sweep_is_published(pool: PgPool) -> Result<()> {
    let server = TestQueueServer::spawn(pool).await?;
    let (office_hour_id, provider) = server.seed_office_hour().await?;
    let provider = Caller::provider(provider);
    let a = new_student();
    let base = format!("/api/v1/office-hours/{office_hour_id}/queue");

    server.post_as(a, &format!("{base}/join")).send().await?;
    server.post_as(provider, &format!("{base}/call-next")).send().await?;

    sqlx::query("UPDATE queue_entries SET ready_expires_at = NOW() - INTERVAL '1 second'")
        .execute(server.pool())
        .await?;
    server.publisher().clear();

    let report = server.engine().auto_no_show_expired_ready().await?;
    assert_eq!(report.items, 1);
    assert_eq!(server.publisher().student_views_for(a.user_id).len(), 1);

    let response = server.get_as(a, &format!("{base}/me")).send().await?;
    let view: StudentView = response.json().await?;
    assert!(view.entry.is_none());

    Ok(())
}
