use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::DatabaseError;

use super::{in_range, ScheduleStore};
use crate::models::{DateRange, DoctorProfile, ExceptionalDate, WeeklyTemplate};

#[derive(Debug, Default)]
struct State {
    doctors: HashMap<Uuid, DoctorProfile>,
    templates: HashMap<Uuid, WeeklyTemplate>,
    exceptions: HashMap<Uuid, Vec<ExceptionalDate>>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryScheduleStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Doctor records are owned elsewhere; this seeds the slice the
    /// scheduling engine reads.
    pub async fn register_doctor(&self, doctor: DoctorProfile) {
        self.state.write().await.doctors.insert(doctor.id, doctor);
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, DatabaseError> {
        Ok(self.state.read().await.doctors.get(&doctor_id).cloned())
    }

    async fn get_weekly_template(
        &self,
        doctor_id: Uuid,
    ) -> Result<Option<WeeklyTemplate>, DatabaseError> {
        Ok(self.state.read().await.templates.get(&doctor_id).cloned())
    }

    async fn replace_weekly_template(
        &self,
        template: WeeklyTemplate,
    ) -> Result<WeeklyTemplate, DatabaseError> {
        self.state
            .write()
            .await
            .templates
            .insert(template.doctor_id, template.clone());
        Ok(template)
    }

    async fn list_exceptional_dates(
        &self,
        doctor_id: Uuid,
        range: Option<DateRange>,
    ) -> Result<Vec<ExceptionalDate>, DatabaseError> {
        let state = self.state.read().await;
        let mut dates: Vec<ExceptionalDate> = state
            .exceptions
            .get(&doctor_id)
            .into_iter()
            .flatten()
            .filter(|e| in_range(range.as_ref(), e.date))
            .cloned()
            .collect();
        dates.sort_by_key(|e| e.date);
        Ok(dates)
    }

    async fn get_exceptional_date(
        &self,
        doctor_id: Uuid,
        exception_id: Uuid,
    ) -> Result<Option<ExceptionalDate>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .exceptions
            .get(&doctor_id)
            .and_then(|dates| dates.iter().find(|e| e.id == exception_id))
            .cloned())
    }

    async fn insert_exceptional_date(
        &self,
        exception: ExceptionalDate,
    ) -> Result<ExceptionalDate, DatabaseError> {
        let mut state = self.state.write().await;
        let dates = state.exceptions.entry(exception.doctor_id).or_default();

        if dates.iter().any(|e| e.date == exception.date) {
            return Err(DatabaseError::Conflict(format!(
                "exceptional date {} already exists for doctor {}",
                exception.date, exception.doctor_id
            )));
        }

        dates.push(exception.clone());
        Ok(exception)
    }

    async fn delete_exceptional_date(
        &self,
        doctor_id: Uuid,
        exception_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        let Some(dates) = state.exceptions.get_mut(&doctor_id) else {
            return Ok(false);
        };

        let before = dates.len();
        dates.retain(|e| e.id != exception_id);
        Ok(dates.len() != before)
    }
}
