//! Lookup of office-hour ownership.
//!
//! Office hours belong to the scheduling subsystem; the queue only needs to
//! know who owns one.

use crate::errors::QueueError;
use crate::repositories::OfficeHoursRepository;
use common::types::{OfficeHourId, UserId};
use sqlx::PgPool;

/// Office hour ownership lookup (enables mocking).
#[async_trait::async_trait]
pub trait OfficeHourLookup: Send + Sync {
    /// Owning provider, or `None` if the office hour does not exist.
    async fn provider_for(&self, office_hour_id: OfficeHourId)
        -> Result<Option<UserId>, QueueError>;
}

/// Reads the `office_hours` table.
pub struct PgOfficeHourLookup {
    pool: PgPool,
}

impl PgOfficeHourLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OfficeHourLookup for PgOfficeHourLookup {
    async fn provider_for(
        &self,
        office_hour_id: OfficeHourId,
    ) -> Result<Option<UserId>, QueueError> {
        OfficeHoursRepository::find_provider(&self.pool, office_hour_id).await
    }
}
