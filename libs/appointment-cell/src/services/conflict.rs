// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::{DoctorProfile, ScheduleService};

use crate::models::{AppointmentError, AvailabilityVerdict};
use crate::services::store::AppointmentStore;

/// Decides whether `[start, end)` can be booked with a doctor.
///
/// Two checks, in order: the interval must sit inside one open interval of
/// the doctor-local date it starts on, and it must not intersect any active
/// appointment other than `exclude`. Read-only.
pub struct ConflictChecker {
    schedules: Arc<ScheduleService>,
    store: Arc<dyn AppointmentStore>,
}

impl ConflictChecker {
    pub fn new(schedules: Arc<ScheduleService>, store: Arc<dyn AppointmentStore>) -> Self {
        Self { schedules, store }
    }

    pub async fn check(
        &self,
        doctor: &DoctorProfile,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<AvailabilityVerdict, AppointmentError> {
        validate_interval(start, end)?;

        let resolver = self.schedules.resolver_at(doctor, start).await?;
        if !resolver.covers(start, end) {
            debug!(
                "{} - {} is outside working hours of doctor {}",
                start, end, doctor.id
            );
            return Ok(AvailabilityVerdict::OutsideWorkingHours);
        }

        let conflicting: Vec<Uuid> = self
            .store
            .list_active_for_doctor(doctor.id, start, end)
            .await?
            .into_iter()
            .filter(|existing| Some(existing.id) != exclude && existing.overlaps(start, end))
            .map(|existing| existing.id)
            .collect();

        if conflicting.is_empty() {
            Ok(AvailabilityVerdict::Available)
        } else {
            warn!(
                "Conflict detected for doctor {} - {} conflicting appointments",
                doctor.id,
                conflicting.len()
            );
            Ok(AvailabilityVerdict::SlotTaken { conflicting })
        }
    }

    pub async fn is_available(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let doctor = self.schedules.get_doctor(doctor_id).await?;
        Ok(self.check(&doctor, start, end, exclude).await?.is_available())
    }

    /// Same check, with each failure mapped to its own error kind.
    pub async fn ensure_available(
        &self,
        doctor: &DoctorProfile,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        match self.check(doctor, start, end, exclude).await? {
            AvailabilityVerdict::Available => Ok(()),
            AvailabilityVerdict::OutsideWorkingHours => Err(AppointmentError::OutsideWorkingHours),
            AvailabilityVerdict::SlotTaken { .. } => Err(AppointmentError::SlotUnavailable),
        }
    }
}

pub fn validate_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppointmentError> {
    if end <= start {
        return Err(AppointmentError::Validation(
            "End time must be after start time".to_string(),
        ));
    }
    Ok(())
}
