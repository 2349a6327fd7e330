//! Persistence seam for schedule data.
//!
//! Two implementations ship: an in-memory store used for tests and
//! single-node deployments, and a Supabase (PostgREST) store.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use shared_database::DatabaseError;

use crate::models::{BookedInterval, DateRange, DoctorProfile, ExceptionalDate, WeeklyTemplate};

pub use memory::InMemoryScheduleStore;
pub use supabase::SupabaseScheduleStore;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, DatabaseError>;

    async fn get_weekly_template(
        &self,
        doctor_id: Uuid,
    ) -> Result<Option<WeeklyTemplate>, DatabaseError>;

    /// Overwrites the whole template of the doctor.
    async fn replace_weekly_template(
        &self,
        template: WeeklyTemplate,
    ) -> Result<WeeklyTemplate, DatabaseError>;

    async fn list_exceptional_dates(
        &self,
        doctor_id: Uuid,
        range: Option<DateRange>,
    ) -> Result<Vec<ExceptionalDate>, DatabaseError>;

    async fn get_exceptional_date(
        &self,
        doctor_id: Uuid,
        exception_id: Uuid,
    ) -> Result<Option<ExceptionalDate>, DatabaseError>;

    /// Fails with `DatabaseError::Conflict` when the doctor already has an
    /// exception on that date.
    async fn insert_exceptional_date(
        &self,
        exception: ExceptionalDate,
    ) -> Result<ExceptionalDate, DatabaseError>;

    /// Returns whether a row was removed.
    async fn delete_exceptional_date(
        &self,
        doctor_id: Uuid,
        exception_id: Uuid,
    ) -> Result<bool, DatabaseError>;
}

/// Read-only view of a doctor's active appointments, so schedule changes can
/// be checked against existing bookings without depending on the booking
/// side.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Active (scheduled or confirmed) bookings intersecting `[from, to)`.
    async fn active_bookings(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookedInterval>, DatabaseError>;
}

pub(crate) fn in_range(range: Option<&DateRange>, date: NaiveDate) -> bool {
    range.map_or(true, |r| r.contains(date))
}
