//! Auto no-show task.
//!
//! Marks ready students who never scanned in before their deadline as
//! no-shows, freeing the slot for the next call.

use crate::services::QueueEngine;
use crate::tasks::generic_sweeper::run_sweeper;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

/// Metric label for this sweep.
pub const SWEEP_NAME: &str = "auto_no_show";

/// Start the auto no-show task. Returns when the token is cancelled.
pub async fn start_no_show_sweeper(
    engine: QueueEngine,
    sweep_interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "queue.task.no_show",
        sweep_interval_ms = sweep_interval.as_millis() as u64,
        "Starting auto no-show task"
    );

    run_sweeper(sweep_interval, cancel_token, SWEEP_NAME, || {
        let engine = engine.clone();
        async move { engine.auto_no_show_expired_ready().await }
    })
    .instrument(tracing::info_span!("queue.task.no_show"))
    .await;

    info!(target: "queue.task.no_show", "Auto no-show task stopped");
}
