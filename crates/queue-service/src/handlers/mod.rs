//! HTTP request handlers for the queue service.

pub mod health;
pub mod metrics;
pub mod queue;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use queue::{
    call_next, complete_current, get_my_status, get_provider_view, join_queue, mark_no_show,
    scan_qr,
};
