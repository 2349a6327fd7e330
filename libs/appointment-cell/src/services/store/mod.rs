//! Persistence seam for appointments.

pub mod memory;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use doctor_cell::{BookedInterval, BookingLedger};
use shared_database::DatabaseError;

use crate::models::{Appointment, AppointmentSearchQuery};

pub use memory::InMemoryAppointmentStore;
pub use supabase::SupabaseAppointmentStore;

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, DatabaseError>;

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, DatabaseError>;

    /// Active appointments of the doctor intersecting `[from, to)`.
    async fn list_active_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, DatabaseError>;

    /// Fails with `DatabaseError::Conflict` when the new row is active and
    /// overlaps another active row of the same doctor.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, DatabaseError>;

    /// Replaces the stored row. Same exclusion rule as `insert`, ignoring the
    /// row itself.
    async fn update(&self, appointment: Appointment) -> Result<Appointment, DatabaseError>;

    /// Marks `original_id` as rescheduled and inserts `replacement` in one
    /// atomic step. Either both writes land or neither does.
    async fn reschedule(
        &self,
        original_id: Uuid,
        replacement: Appointment,
    ) -> Result<Appointment, DatabaseError>;

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, DatabaseError>;
}

/// Exposes an appointment store to the schedule side as a booking ledger.
pub struct StoreLedger {
    store: Arc<dyn AppointmentStore>,
}

impl StoreLedger {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BookingLedger for StoreLedger {
    async fn active_bookings(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookedInterval>, DatabaseError> {
        let appointments = self.store.list_active_for_doctor(doctor_id, from, to).await?;
        Ok(appointments
            .into_iter()
            .map(|a| BookedInterval {
                appointment_id: a.id,
                start: a.start_time,
                end: a.end_time,
            })
            .collect())
    }
}
