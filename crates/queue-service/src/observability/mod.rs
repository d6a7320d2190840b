//! Observability for the queue service.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
