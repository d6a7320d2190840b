//! Office-hours queue service library.
//!
//! Runs the live queue for provider office hours:
//!
//! - Students join a FIFO queue and see their position and estimated wait
//! - The provider calls the next student, who becomes "ready"
//! - The ready student checks in by scanning a rotating, signed QR code
//! - Ready students who never check in time out as no-shows
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/queue_engine.rs -> repositories/*.rs
//!                                        |
//! tasks/*.rs (rotation, no-show) --------+
//! ```
//!
//! All queue mutations for one office hour are serialized on its session row.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `crypto` - QR check-in token signing
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Caller identity and HTTP metrics
//! - `models` - Queue records and state machine
//! - `observability` - Prometheus metrics
//! - `repositories` - Postgres access
//! - `routes` - Axum router setup
//! - `services` - Queue engine, view projection, publisher, audit
//! - `tasks` - Background sweepers

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
