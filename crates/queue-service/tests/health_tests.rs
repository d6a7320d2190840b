//! Operational endpoint integration tests.
//!
//! Tests `/health` (liveness), `/ready` (readiness) and `/metrics` using the
//! `TestQueueServer` harness.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use queue_test_utils::TestQueueServer;
use sqlx::PgPool;

/// `/health` returns 200 and plain text "OK".
#[sqlx::test(migrations = "../../migrations")]
async fn test_health_endpoint_returns_200(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestQueueServer::spawn(pool).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}

/// `/ready` pings the database and reports JSON.
#[sqlx::test(migrations = "../../migrations")]
async fn test_ready_endpoint_reports_database(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestQueueServer::spawn(pool).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert!(
        content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["database"], "healthy");
    assert!(body.get("error").is_none());

    Ok(())
}

/// `/ready` reports 503 once the pool is closed.
#[sqlx::test(migrations = "../../migrations")]
async fn test_ready_endpoint_reports_unavailable_database(
    pool: PgPool,
) -> Result<(), anyhow::Error> {
    let server = TestQueueServer::spawn(pool.clone()).await?;
    pool.close().await;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 503);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["error"], "Service dependencies unavailable");

    Ok(())
}

/// `/metrics` is public and serves Prometheus text.
#[sqlx::test(migrations = "../../migrations")]
async fn test_metrics_endpoint_is_public(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestQueueServer::spawn(pool).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), 200);

    Ok(())
}

/// Health endpoints need no identity headers; queue endpoints do.
#[sqlx::test(migrations = "../../migrations")]
async fn test_queue_routes_require_identity(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestQueueServer::spawn(pool).await?;
    let (office_hour_id, _) = server.seed_office_hour().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!(
            "{}/api/v1/office-hours/{}/queue/join",
            server.url(),
            office_hour_id
        ))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let response = client
        .post(format!("{}/api/v1/queue/scan", server.url()))
        .header("x-user-id", "not-a-uuid")
        .header("x-user-role", "student")
        .json(&serde_json::json!({ "token": "abc.def" }))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    Ok(())
}
