//! Test server harness for E2E testing
//!
//! Provides `TestQueueServer` for spawning real queue service instances in tests.

use crate::fixtures::{
    seed_office_hour, test_codec, test_metrics_handle, test_settings, TEST_SIGNING_SECRET,
};
use common::types::{OfficeHourId, UserId};
use queue_service::config::Config;
use queue_service::models::Caller;
use queue_service::routes::{self, AppState};
use queue_service::services::publisher::mock::RecordingPublisher;
use queue_service::services::{PgAuditSink, PgOfficeHourLookup, QueueEngine};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the queue service in E2E tests.
///
/// The engine uses the real Postgres audit sink and office hour lookup, and a
/// recording publisher so tests can assert what was pushed to clients.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_health_flow_e2e(pool: PgPool) -> Result<()> {
///     let server = TestQueueServer::spawn(pool).await?;
///
///     let response = reqwest::get(&format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestQueueServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    engine: QueueEngine,
    publisher: Arc<RecordingPublisher>,
    client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestQueueServer {
    /// Spawn a new test server instance.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    ///
    /// Background sweepers are not started; tests drive them through
    /// [`TestQueueServer::engine`].
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "QR_SIGNING_SECRET".to_string(),
                TEST_SIGNING_SECRET.to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let publisher = Arc::new(RecordingPublisher::new());
        let engine = QueueEngine::new(
            pool.clone(),
            Arc::new(test_codec()),
            test_settings(),
            publisher.clone(),
            Arc::new(PgAuditSink::new(pool.clone())),
            Arc::new(PgOfficeHourLookup::new(pool.clone())),
        );

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
            engine: engine.clone(),
        });

        let app = routes::build_routes(state, test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            engine,
            publisher,
            client: reqwest::Client::new(),
            _handle: handle,
        })
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The engine behind the server, for driving sweeps.
    pub fn engine(&self) -> &QueueEngine {
        &self.engine
    }

    /// Everything the server has published.
    pub fn publisher(&self) -> &RecordingPublisher {
        &self.publisher
    }

    /// Insert an office hour owned by a fresh provider.
    pub async fn seed_office_hour(&self) -> Result<(OfficeHourId, UserId), anyhow::Error> {
        seed_office_hour(&self.pool).await
    }

    /// GET `path` with `caller`'s identity headers.
    pub fn get_as(&self, caller: Caller, path: &str) -> reqwest::RequestBuilder {
        self.with_identity(self.client.get(format!("{}{}", self.url(), path)), caller)
    }

    /// POST `path` with `caller`'s identity headers.
    pub fn post_as(&self, caller: Caller, path: &str) -> reqwest::RequestBuilder {
        self.with_identity(self.client.post(format!("{}{}", self.url(), path)), caller)
    }

    fn with_identity(
        &self,
        builder: reqwest::RequestBuilder,
        caller: Caller,
    ) -> reqwest::RequestBuilder {
        builder
            .header("x-user-id", caller.user_id.to_string())
            .header("x-user-role", caller.role.as_str())
    }
}

impl Drop for TestQueueServer {
    fn drop(&mut self) {
        // Abort the server task so the port is released when the test ends
        self._handle.abort();
    }
}
