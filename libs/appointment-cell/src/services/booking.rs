// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{DoctorProfile, ScheduleService};
use shared_database::DatabaseError;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    AvailabilityVerdict, CancelledBy, CreateAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::conflict::{validate_interval, ConflictChecker};
use crate::services::lifecycle::{AppointmentLifecycle, LifecycleOperation};
use crate::services::store::AppointmentStore;

/// Lifecycle operations on appointments.
///
/// Every write runs under the doctor's lock from the schedule service, so
/// the conflict check and the write it guards are one step per doctor. The
/// store's exclusion rule backs this up across processes; a rejected commit
/// is reported as `SlotUnavailable` and never retried here.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    schedules: Arc<ScheduleService>,
    conflicts: ConflictChecker,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn AppointmentStore>, schedules: Arc<ScheduleService>) -> Self {
        let conflicts = ConflictChecker::new(Arc::clone(&schedules), Arc::clone(&store));
        Self {
            store,
            schedules,
            conflicts,
        }
    }

    pub fn conflicts(&self) -> &ConflictChecker {
        &self.conflicts
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    pub async fn check_availability(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<AvailabilityVerdict, AppointmentError> {
        let doctor = self.schedules.get_doctor(doctor_id).await?;
        self.conflicts.check(&doctor, start, end, exclude).await
    }

    pub async fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if to <= from {
                return Err(AppointmentError::Validation(
                    "'to' must be after 'from'".to_string(),
                ));
            }
        }
        debug!("Searching appointments with {:?}", query);
        Ok(self.store.search(query).await?)
    }

    pub async fn get_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        self.search_appointments(&AppointmentSearchQuery {
            doctor_id: Some(doctor_id),
            ..Default::default()
        })
        .await
    }

    pub async fn get_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        self.search_appointments(&AppointmentSearchQuery {
            patient_id: Some(patient_id),
            ..Default::default()
        })
        .await
    }

    pub async fn get_by_status(
        &self,
        status: AppointmentStatus,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.search_appointments(&AppointmentSearchQuery {
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    pub async fn get_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.search_appointments(&AppointmentSearchQuery {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        })
        .await
    }

    // ==========================================================================
    // MUTATIONS
    // ==========================================================================

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, patient_id = %request.patient_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        validate_interval(request.start_time, request.end_time)?;
        self.ensure_not_in_past(request.start_time)?;

        let doctor = self.bookable_doctor(request.doctor_id).await?;
        if !self.store.patient_exists(request.patient_id).await? {
            return Err(AppointmentError::PatientNotFound(request.patient_id));
        }

        let _guard = self.schedules.locks().acquire(doctor.id).await;

        self.conflicts
            .ensure_available(&doctor, request.start_time, request.end_time, None)
            .await?;

        let now = self.schedules.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: doctor.id,
            start_time: request.start_time,
            end_time: request.end_time,
            status: AppointmentStatus::Scheduled,
            notes: normalize_notes(request.notes),
            cancellation_reason: None,
            cancelled_by: None,
            reschedule_of: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert(appointment).await.map_err(slot_taken_on_conflict)?;

        info!(
            "Appointment {} booked with doctor {} at {}",
            stored.id, stored.doctor_id, stored.start_time
        );
        Ok(stored)
    }

    /// Changes notes and/or times of an active appointment in place.
    #[instrument(skip(self, request), fields(appointment_id = %appointment_id))]
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        let _guard = self.schedules.locks().acquire(current.doctor_id).await;

        // Re-read under the lock so the status check sees the latest row.
        let mut appointment = self.get_appointment(appointment_id).await?;
        AppointmentLifecycle::transition(appointment.status, LifecycleOperation::Update)?;

        let start = request.start_time.unwrap_or(appointment.start_time);
        let end = request.end_time.unwrap_or(appointment.end_time);
        let time_changed = start != appointment.start_time || end != appointment.end_time;

        if time_changed {
            validate_interval(start, end)?;
            self.ensure_not_in_past(start)?;

            let doctor = self.schedules.get_doctor(appointment.doctor_id).await?;
            self.conflicts
                .ensure_available(&doctor, start, end, Some(appointment.id))
                .await?;

            appointment.start_time = start;
            appointment.end_time = end;
        }

        if request.notes.is_some() {
            appointment.notes = normalize_notes(request.notes);
        }
        appointment.updated_at = self.schedules.now();

        let stored = self.store.update(appointment).await.map_err(slot_taken_on_conflict)?;
        info!("Appointment {} updated (time changed: {})", stored.id, time_changed);
        Ok(stored)
    }

    #[instrument(skip(self), fields(appointment_id = %appointment_id))]
    pub async fn confirm_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.apply_transition(appointment_id, LifecycleOperation::Confirm, |_| Ok(()))
            .await
    }

    #[instrument(skip(self, reason), fields(appointment_id = %appointment_id))]
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: String,
        cancelled_by: CancelledBy,
    ) -> Result<Appointment, AppointmentError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(AppointmentError::Validation(
                "A cancellation reason is required".to_string(),
            ));
        }

        self.apply_transition(appointment_id, LifecycleOperation::Cancel, move |appointment| {
            appointment.cancellation_reason = Some(reason);
            appointment.cancelled_by = Some(cancelled_by);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(appointment_id = %appointment_id))]
    pub async fn complete_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let now = self.schedules.now();
        self.apply_transition(appointment_id, LifecycleOperation::Complete, move |appointment| {
            if appointment.end_time > now {
                return Err(AppointmentError::Validation(format!(
                    "Appointment {} has not ended yet",
                    appointment.id
                )));
            }
            Ok(())
        })
        .await
    }

    /// Moves an appointment: the original becomes `Rescheduled` and a new
    /// `Scheduled` row referencing it takes the new interval. Returns the
    /// new appointment.
    #[instrument(skip(self), fields(appointment_id = %appointment_id))]
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        validate_interval(new_start, new_end)?;
        self.ensure_not_in_past(new_start)?;

        let current = self.get_appointment(appointment_id).await?;
        let _guard = self.schedules.locks().acquire(current.doctor_id).await;

        let original = self.get_appointment(appointment_id).await?;
        AppointmentLifecycle::transition(original.status, LifecycleOperation::Reschedule)?;

        let doctor = self.schedules.get_doctor(original.doctor_id).await?;
        self.conflicts
            .ensure_available(&doctor, new_start, new_end, Some(original.id))
            .await?;

        let now = self.schedules.now();
        let replacement = Appointment {
            id: Uuid::new_v4(),
            patient_id: original.patient_id,
            doctor_id: original.doctor_id,
            start_time: new_start,
            end_time: new_end,
            status: AppointmentStatus::Scheduled,
            notes: original.notes.clone(),
            cancellation_reason: None,
            cancelled_by: None,
            reschedule_of: Some(original.id),
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .store
            .reschedule(original.id, replacement)
            .await
            .map_err(slot_taken_on_conflict)?;

        info!(
            "Appointment {} rescheduled to {} ({} - {})",
            original.id, stored.id, stored.start_time, stored.end_time
        );
        Ok(stored)
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn apply_transition<F>(
        &self,
        appointment_id: Uuid,
        operation: LifecycleOperation,
        mutate: F,
    ) -> Result<Appointment, AppointmentError>
    where
        F: FnOnce(&mut Appointment) -> Result<(), AppointmentError> + Send,
    {
        let current = self.get_appointment(appointment_id).await?;
        let _guard = self.schedules.locks().acquire(current.doctor_id).await;

        let mut appointment = self.get_appointment(appointment_id).await?;
        let next = AppointmentLifecycle::transition(appointment.status, operation)?;
        mutate(&mut appointment)?;

        appointment.status = next;
        appointment.updated_at = self.schedules.now();

        let stored = self.store.update(appointment).await?;
        info!("Appointment {} is now {}", stored.id, stored.status);
        Ok(stored)
    }

    async fn bookable_doctor(&self, doctor_id: Uuid) -> Result<DoctorProfile, AppointmentError> {
        let doctor = self.schedules.get_doctor(doctor_id).await?;
        if !doctor.is_active {
            warn!("Booking attempted with inactive doctor {}", doctor_id);
            return Err(AppointmentError::Validation(format!(
                "Doctor {} is not accepting appointments",
                doctor_id
            )));
        }
        Ok(doctor)
    }

    fn ensure_not_in_past(&self, start: DateTime<Utc>) -> Result<(), AppointmentError> {
        if start < self.schedules.now() {
            return Err(AppointmentError::Validation(
                "Appointments cannot start in the past".to_string(),
            ));
        }
        Ok(())
    }
}

fn slot_taken_on_conflict(error: DatabaseError) -> AppointmentError {
    if error.is_conflict() {
        warn!("Store rejected overlapping appointment: {}", error);
        AppointmentError::SlotUnavailable
    } else {
        AppointmentError::Database(error)
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
