//! QR token rotation task.
//!
//! Replaces the check-in token of every ready student once it is older than
//! the rotation interval, so a photographed code stops working quickly.

use crate::services::QueueEngine;
use crate::tasks::generic_sweeper::run_sweeper;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

/// Metric label for this sweep.
pub const SWEEP_NAME: &str = "qr_rotation";

/// Start the QR rotation task. Returns when the token is cancelled.
///
/// The loop ticks at half the rotation interval (at least one second) so a
/// token is never served much past its rotation age.
pub async fn start_qr_rotation(
    engine: QueueEngine,
    rotation_interval: Duration,
    cancel_token: CancellationToken,
) {
    let tick = tick_interval(rotation_interval);
    info!(
        target: "queue.task.qr_rotation",
        rotation_interval_ms = rotation_interval.as_millis() as u64,
        tick_ms = tick.as_millis() as u64,
        "Starting QR rotation task"
    );

    run_sweeper(tick, cancel_token, SWEEP_NAME, || {
        let engine = engine.clone();
        async move { engine.rotate_ready_qr_tokens().await }
    })
    .instrument(tracing::info_span!("queue.task.qr_rotation"))
    .await;

    info!(target: "queue.task.qr_rotation", "QR rotation task stopped");
}

fn tick_interval(rotation_interval: Duration) -> Duration {
    (rotation_interval / 2).max(Duration::from_secs(1))
}
