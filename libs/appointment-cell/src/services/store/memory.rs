use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::DatabaseError;

use super::AppointmentStore;
use crate::models::{Appointment, AppointmentSearchQuery, AppointmentStatus};

#[derive(Debug, Default)]
struct State {
    patients: HashSet<Uuid>,
    appointments: HashMap<Uuid, Appointment>,
}

impl State {
    /// The exclusion constraint: no two active rows of one doctor overlap.
    fn check_exclusion(&self, candidate: &Appointment, ignore: &[Uuid]) -> Result<(), DatabaseError> {
        if !candidate.is_active() {
            return Ok(());
        }

        let clash = self.appointments.values().find(|existing| {
            existing.doctor_id == candidate.doctor_id
                && existing.id != candidate.id
                && !ignore.contains(&existing.id)
                && existing.is_active()
                && existing.overlaps(candidate.start_time, candidate.end_time)
        });

        match clash {
            Some(existing) => Err(DatabaseError::Conflict(format!(
                "appointment {} overlaps active appointment {}",
                candidate.id, existing.id
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAppointmentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_patient(&self, patient_id: Uuid) {
        self.state.write().await.patients.insert(patient_id);
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.state.read().await.patients.contains(&patient_id))
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        Ok(self.state.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn list_active_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let state = self.state.read().await;
        let mut active: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.is_active() && a.overlaps(from, to))
            .cloned()
            .collect();
        active.sort_by_key(|a| a.start_time);
        Ok(active)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, DatabaseError> {
        let mut state = self.state.write().await;
        if state.appointments.contains_key(&appointment.id) {
            return Err(DatabaseError::Conflict(format!(
                "appointment {} already exists",
                appointment.id
            )));
        }
        state.check_exclusion(&appointment, &[])?;

        state.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.appointments.contains_key(&appointment.id) {
            return Err(DatabaseError::NotFound(format!("appointment {}", appointment.id)));
        }
        state.check_exclusion(&appointment, &[])?;

        state.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn reschedule(
        &self,
        original_id: Uuid,
        replacement: Appointment,
    ) -> Result<Appointment, DatabaseError> {
        let mut state = self.state.write().await;

        let original = state
            .appointments
            .get(&original_id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("appointment {}", original_id)))?;
        if !original.is_active() {
            return Err(DatabaseError::Conflict(format!(
                "appointment {} is no longer active",
                original_id
            )));
        }

        // Validate everything before the first write.
        state.check_exclusion(&replacement, &[original_id])?;

        let mut retired = original;
        retired.status = AppointmentStatus::Rescheduled;
        retired.updated_at = replacement.created_at;

        state.appointments.insert(retired.id, retired);
        state.appointments.insert(replacement.id, replacement.clone());
        Ok(replacement)
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, DatabaseError> {
        let state = self.state.read().await;
        let mut found: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.start_time, a.created_at));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }
}
