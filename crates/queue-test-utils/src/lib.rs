//! # Queue Test Utilities
//!
//! Shared test utilities for the office-hours queue service.
//!
//! This crate provides:
//! - Fixtures (`seed_office_hour`, `TestEngine` wired with recording mocks)
//! - Server test harness (`TestQueueServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use queue_test_utils::*;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_example(pool: PgPool) -> Result<()> {
//!     let server = TestQueueServer::spawn(pool).await?;
//!     let (office_hour_id, provider) = server.seed_office_hour().await?;
//!
//!     let response = server
//!         .post_as(student, &format!("/api/v1/office-hours/{office_hour_id}/queue/join"))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
