//! Repositories for queue state.
//!
//! Each repository is a unit struct with associated async functions.
//! Single-statement functions accept any `PgExecutor` so they run equally
//! against the pool or inside an open transaction; functions issuing more
//! than one statement take `&mut PgConnection`.
//!
//! All queries are runtime-checked (`sqlx::query`/`query_as`) and fully
//! parameterized.

pub mod audit_events;
pub mod office_hours;
pub mod qr_tokens;
pub mod queue_entries;
pub mod sessions;

pub use audit_events::{AuditEvent, AuditEventsRepository};
pub use office_hours::OfficeHoursRepository;
pub use qr_tokens::QrTokensRepository;
pub use queue_entries::{QueueEntriesRepository, SweepCandidate};
pub use sessions::QueueSessionsRepository;
