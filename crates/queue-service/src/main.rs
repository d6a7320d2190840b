//! Office-hours queue service
//!
//! Entry point. Startup order:
//!
//! 1. Tracing
//! 2. Configuration (logged once)
//! 3. Database pool
//! 4. QR token codec (a bad secret is fatal)
//! 5. Metrics recorder
//! 6. Queue engine and background sweepers
//! 7. HTTP server with graceful shutdown

use queue_service::config::Config;
use queue_service::crypto::QrTokenCodec;
use queue_service::observability::metrics::init_metrics_recorder;
use queue_service::routes::{self, AppState};
use queue_service::services::{
    BroadcastPublisher, PgAuditSink, PgOfficeHourLookup, QueueEngine, QueueSettings,
};
use queue_service::tasks::{start_no_show_sweeper, start_qr_rotation};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,queue=debug,queue_service=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting office-hours queue service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        qr_rotation_interval_seconds = config.qr_rotation_interval_seconds,
        qr_ttl_seconds = config.qr_ttl_seconds,
        no_show_timeout_seconds = config.no_show_timeout_seconds,
        no_show_sweep_interval_seconds = config.no_show_sweep_interval_seconds,
        estimated_minutes_per_student = config.estimated_minutes_per_student,
        drain_seconds = config.drain_seconds,
        "Configuration loaded successfully"
    );

    // Migrations are applied out of band, not here
    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    let codec = QrTokenCodec::from_base64_secret(&config.qr_signing_secret).map_err(|e| {
        error!("Failed to initialize QR token codec: {}", e);
        e
    })?;

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let publisher = Arc::new(BroadcastPublisher::default());
    let engine = QueueEngine::new(
        db_pool.clone(),
        Arc::new(codec),
        QueueSettings::from_config(&config),
        publisher,
        Arc::new(PgAuditSink::new(db_pool.clone())),
        Arc::new(PgOfficeHourLookup::new(db_pool.clone())),
    );

    let cancel_token = CancellationToken::new();

    let rotation_handle = tokio::spawn(start_qr_rotation(
        engine.clone(),
        config.qr_rotation_interval(),
        cancel_token.child_token(),
    ));
    let no_show_handle = tokio::spawn(start_no_show_sweeper(
        engine.clone(),
        config.no_show_sweep_interval(),
        cancel_token.child_token(),
    ));

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState {
        pool: db_pool,
        config,
        engine,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Queue service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    info!("HTTP server stopped, stopping background tasks");
    cancel_token.cancel();
    for (name, handle) in [("qr_rotation", rotation_handle), ("no_show", no_show_handle)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }

    info!("Queue service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}

/// Adds statement_timeout to the database URL so queries cannot hang.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
