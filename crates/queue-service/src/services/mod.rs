//! Queue services.
//!
//! The engine and the collaborators it talks to through traits.

pub mod audit;
pub mod office_hours;
pub mod publisher;
pub mod queue_engine;
pub mod view_projector;

pub use audit::{AuditSink, PgAuditSink};
pub use office_hours::{OfficeHourLookup, PgOfficeHourLookup};
pub use publisher::{BroadcastPublisher, QueueUpdate, RealtimePublisher};
pub use queue_engine::{QueueEngine, QueueSettings, SweepReport};
pub use view_projector::{ProviderView, StudentEntryView, StudentView};
