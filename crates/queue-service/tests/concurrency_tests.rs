//! Concurrency tests.
//!
//! Parallel writers against one session must leave at most one student ready
//! or in progress, one active entry per student, and one successful scan per
//! token.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use futures::future::join_all;
use queue_service::errors::QueueError;
use queue_service::models::Caller;
use queue_test_utils::{expire_ready_deadline, new_student, seed_office_hour, TestEngine};
use sqlx::PgPool;

async fn occupied_slots(pool: &PgPool) -> Result<i64> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(*) FROM queue_entries WHERE status IN ('ready', 'in_progress')",
    )
    .fetch_one(pool)
    .await?)
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_parallel_call_next_admits_one(pool: PgPool) -> Result<()> {
    let (office_hour_id, provider) = seed_office_hour(&pool).await?;
    let provider = Caller::provider(provider);
    let t = TestEngine::new(pool.clone());

    for _ in 0..5 {
        t.engine.join_queue(new_student(), office_hour_id, None).await?;
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = t.engine.clone();
            tokio::spawn(async move { engine.call_next(provider, office_hour_id).await })
        })
        .collect();

    let mut ok = 0;
    for result in join_all(handles).await {
        match result? {
            Ok(_) => ok += 1,
            Err(QueueError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(occupied_slots(&pool).await?, 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_parallel_joins_create_one_entry(pool: PgPool) -> Result<()> {
    let (office_hour_id, _) = seed_office_hour(&pool).await?;
    let t = TestEngine::new(pool.clone());
    let student = new_student();

    // First join also races on session creation
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = t.engine.clone();
            tokio::spawn(async move { engine.join_queue(student, office_hour_id, None).await })
        })
        .collect();

    let mut entry_ids = Vec::new();
    for result in join_all(handles).await {
        entry_ids.push(result??.entry.unwrap().entry_id);
    }
    entry_ids.dedup();
    assert_eq!(entry_ids.len(), 1);

    let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_sessions")
        .fetch_one(&pool)
        .await?;
    let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries")
        .fetch_one(&pool)
        .await?;
    assert_eq!(sessions, 1);
    assert_eq!(entries, 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_parallel_scans_check_in_once(pool: PgPool) -> Result<()> {
    let (office_hour_id, provider) = seed_office_hour(&pool).await?;
    let provider = Caller::provider(provider);
    let t = TestEngine::new(pool.clone());
    let student = new_student();

    t.engine.join_queue(student, office_hour_id, None).await?;
    let token = t
        .engine
        .call_next(provider, office_hour_id)
        .await?
        .qr_token
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = t.engine.clone();
            let token = token.clone();
            tokio::spawn(async move { engine.scan_qr(student, &token).await })
        })
        .collect();

    let mut ok = 0;
    for result in join_all(handles).await {
        match result? {
            Ok(_) => ok += 1,
            Err(QueueError::BadRequest(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(ok, 1);

    let checked_in = t
        .audit
        .actions()
        .iter()
        .filter(|a| a.as_str() == "queue.entry.checked_in")
        .count();
    assert_eq!(checked_in, 1);

    Ok(())
}

/// The no-show sweep and provider calls racing on the same session never
/// leave more than one occupied slot. If every call lands before the sweep,
/// the slot ends up empty.
#[sqlx::test(migrations = "../../migrations")]
async fn test_sweep_and_call_next_race(pool: PgPool) -> Result<()> {
    let (office_hour_id, provider) = seed_office_hour(&pool).await?;
    let provider = Caller::provider(provider);
    let t = TestEngine::new(pool.clone());

    let first = t
        .engine
        .join_queue(new_student(), office_hour_id, None)
        .await?
        .entry
        .unwrap();
    for _ in 0..3 {
        t.engine.join_queue(new_student(), office_hour_id, None).await?;
    }
    t.engine.call_next(provider, office_hour_id).await?;
    expire_ready_deadline(&pool, first.entry_id.0).await?;

    let sweeper = {
        let engine = t.engine.clone();
        tokio::spawn(async move { engine.auto_no_show_expired_ready().await })
    };
    let callers: Vec<_> = (0..4)
        .map(|_| {
            let engine = t.engine.clone();
            tokio::spawn(async move { engine.call_next(provider, office_hour_id).await })
        })
        .collect();

    sweeper.await??;
    let mut ok = 0;
    for result in join_all(callers).await {
        match result? {
            Ok(_) => ok += 1,
            Err(QueueError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert!(ok <= 1);
    assert_eq!(occupied_slots(&pool).await?, ok);

    Ok(())
}

/// Sessions never block each other.
#[sqlx::test(migrations = "../../migrations")]
async fn test_independent_sessions(pool: PgPool) -> Result<()> {
    let t = TestEngine::new(pool.clone());

    let mut setups = Vec::new();
    for _ in 0..3 {
        let (office_hour_id, provider) = seed_office_hour(&pool).await?;
        t.engine.join_queue(new_student(), office_hour_id, None).await?;
        setups.push((office_hour_id, Caller::provider(provider)));
    }

    let handles: Vec<_> = setups
        .into_iter()
        .map(|(office_hour_id, provider)| {
            let engine = t.engine.clone();
            tokio::spawn(async move { engine.call_next(provider, office_hour_id).await })
        })
        .collect();

    for result in join_all(handles).await {
        result??;
    }
    assert_eq!(occupied_slots(&pool).await?, 3);

    Ok(())
}
