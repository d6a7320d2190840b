//! Middleware for the queue service.
//!
//! # Components
//!
//! - `auth` - Caller identity from gateway headers for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::require_caller;
pub use http_metrics::http_metrics_middleware;
