//! Read-only access to the scheduling subsystem's office hours.

use crate::errors::QueueError;
use common::types::{OfficeHourId, UserId};
use sqlx::PgExecutor;
use uuid::Uuid;

pub struct OfficeHoursRepository;

impl OfficeHoursRepository {
    /// Owning provider of an office hour, or `None` if it does not exist.
    pub async fn find_provider<'e, E: PgExecutor<'e>>(
        executor: E,
        office_hour_id: OfficeHourId,
    ) -> Result<Option<UserId>, QueueError> {
        let provider: Option<Uuid> = sqlx::query_scalar(
            "SELECT provider_user_id FROM office_hours WHERE office_hour_id = $1",
        )
        .bind(office_hour_id.0)
        .fetch_optional(executor)
        .await?;

        Ok(provider.map(UserId))
    }
}
