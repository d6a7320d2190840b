//! Generic sweeper background task.
//!
//! Runs a sweep closure on a fixed interval until cancelled. The QR rotation
//! and no-show sweepers are thin wrappers around this loop.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. A pass that
//! is already running completes before the loop exits.

use crate::errors::QueueError;
use crate::observability::metrics::record_sweep;
use crate::services::SweepReport;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run the generic sweeper loop.
///
/// Calls `sweep_fn` every `interval` and records the outcome under the
/// `sweep_name` metric label. Errors are logged and the loop keeps going.
/// Exits when the cancellation token is triggered.
///
/// Callers should chain `.instrument(tracing::info_span!(...))` on the
/// returned future to name the span.
pub async fn run_sweeper<F, Fut>(
    interval: Duration,
    cancel_token: CancellationToken,
    sweep_name: &'static str,
    sweep_fn: F,
) where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = Result<SweepReport, QueueError>> + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_pass(sweep_name, &sweep_fn).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "queue.task.sweeper",
                    sweep = sweep_name,
                    "Sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}

/// Run one sweep pass and record its metrics.
///
/// Returns the number of items changed, zero on error.
pub async fn run_pass<F, Fut>(sweep_name: &'static str, sweep_fn: &F) -> usize
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<SweepReport, QueueError>>,
{
    let start = Instant::now();
    match sweep_fn().await {
        Ok(report) => {
            record_sweep(sweep_name, report.items as u64, start.elapsed());
            if report.items > 0 || report.sessions_failed > 0 {
                info!(
                    target: "queue.task.sweeper",
                    sweep = sweep_name,
                    items = report.items,
                    sessions_touched = report.sessions_touched,
                    sessions_failed = report.sessions_failed,
                    "Sweep pass finished"
                );
            } else {
                debug!(target: "queue.task.sweeper", sweep = sweep_name, "Sweep pass found nothing");
            }
            report.items
        }
        Err(e) => {
            record_sweep(sweep_name, 0, start.elapsed());
            // Keep running; the database may recover
            tracing::error!(
                target: "queue.task.sweeper",
                sweep = sweep_name,
                error = %e,
                "Sweep pass failed"
            );
            0
        }
    }
}
