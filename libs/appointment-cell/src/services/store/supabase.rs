use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};

use super::AppointmentStore;
use crate::models::{Appointment, AppointmentSearchQuery};

/// Appointment store over the `appointments` and `patients` tables.
///
/// The table carries an exclusion constraint on
/// `(doctor_id, tstzrange(start_time, end_time))` for active rows, so a
/// racing insert surfaces as `DatabaseError::Conflict`. Reschedules go
/// through the `reschedule_appointment` function, which runs both writes
/// in one transaction.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

fn timestamp(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)).into_owned()
}

fn first_row(rows: Vec<Appointment>, what: &str) -> Result<Appointment, DatabaseError> {
    rows.into_iter().next().ok_or_else(|| DatabaseError::Api {
        status: 200,
        message: format!("{} returned no rows", what),
    })
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, DatabaseError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(!rows.is_empty())
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_active_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(scheduled,confirmed)&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            doctor_id,
            timestamp(to),
            timestamp(from)
        );
        self.supabase.request(Method::GET, &path, None, None).await
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, DatabaseError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                None,
                Some(serde_json::to_value(&appointment)?),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;
        first_row(rows, "insert")
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment, DatabaseError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "start_time": appointment.start_time,
            "end_time": appointment.end_time,
            "status": appointment.status,
            "notes": appointment.notes,
            "cancellation_reason": appointment.cancellation_reason,
            "cancelled_by": appointment.cancelled_by,
            "updated_at": appointment.updated_at,
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(body),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| DatabaseError::NotFound(format!("appointment {}", appointment.id)))
    }

    async fn reschedule(
        &self,
        original_id: Uuid,
        replacement: Appointment,
    ) -> Result<Appointment, DatabaseError> {
        debug!(
            "Rescheduling appointment {} to {} via rpc",
            original_id, replacement.id
        );

        let args = json!({
            "p_original_id": original_id,
            "p_replacement": replacement,
        });
        let rows: Vec<Appointment> = self.supabase.rpc("reschedule_appointment", args).await?;
        first_row(rows, "reschedule_appointment")
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, DatabaseError> {
        let mut filters = vec!["order=start_time.asc".to_string()];
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.from {
            filters.push(format!("end_time=gt.{}", timestamp(from)));
        }
        if let Some(to) = query.to {
            filters.push(format!("start_time=lt.{}", timestamp(to)));
        }
        if let Some(limit) = query.limit {
            filters.push(format!("limit={}", limit));
        }

        let path = format!("/rest/v1/appointments?{}", filters.join("&"));
        self.supabase.request(Method::GET, &path, None, None).await
    }
}
