use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DatabaseError, SupabaseClient};

use super::ScheduleStore;
use crate::models::{DateRange, DoctorProfile, ExceptionalDate, WeeklyTemplate};

/// Schedule store backed by the `doctors`, `doctor_weekly_schedules` and
/// `doctor_exceptional_dates` tables. The unique index on
/// `(doctor_id, date)` is what rejects duplicate exceptions.
pub struct SupabaseScheduleStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseScheduleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl ScheduleStore for SupabaseScheduleStore {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, DatabaseError> {
        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,timezone,is_active",
            doctor_id
        );
        let rows: Vec<DoctorProfile> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_weekly_template(
        &self,
        doctor_id: Uuid,
    ) -> Result<Option<WeeklyTemplate>, DatabaseError> {
        let path = format!("/rest/v1/doctor_weekly_schedules?doctor_id=eq.{}", doctor_id);
        let rows: Vec<WeeklyTemplate> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn replace_weekly_template(
        &self,
        template: WeeklyTemplate,
    ) -> Result<WeeklyTemplate, DatabaseError> {
        debug!("Upserting weekly schedule for doctor {}", template.doctor_id);

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        let body = serde_json::to_value(&template)?;
        let rows: Vec<WeeklyTemplate> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_weekly_schedules?on_conflict=doctor_id",
                None,
                Some(body),
                Some(headers),
            )
            .await?;

        rows.into_iter().next().ok_or_else(|| DatabaseError::Api {
            status: 200,
            message: "upsert returned no rows".to_string(),
        })
    }

    async fn list_exceptional_dates(
        &self,
        doctor_id: Uuid,
        range: Option<DateRange>,
    ) -> Result<Vec<ExceptionalDate>, DatabaseError> {
        let mut path = format!(
            "/rest/v1/doctor_exceptional_dates?doctor_id=eq.{}&order=date.asc",
            doctor_id
        );
        if let Some(range) = range {
            path.push_str(&format!("&date=gte.{}&date=lte.{}", range.from, range.to));
        }

        self.supabase.request(Method::GET, &path, None, None).await
    }

    async fn get_exceptional_date(
        &self,
        doctor_id: Uuid,
        exception_id: Uuid,
    ) -> Result<Option<ExceptionalDate>, DatabaseError> {
        let path = format!(
            "/rest/v1/doctor_exceptional_dates?id=eq.{}&doctor_id=eq.{}",
            exception_id, doctor_id
        );
        let rows: Vec<ExceptionalDate> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_exceptional_date(
        &self,
        exception: ExceptionalDate,
    ) -> Result<ExceptionalDate, DatabaseError> {
        let rows: Vec<ExceptionalDate> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_exceptional_dates",
                None,
                Some(serde_json::to_value(&exception)?),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;

        rows.into_iter().next().ok_or_else(|| DatabaseError::Api {
            status: 201,
            message: "insert returned no rows".to_string(),
        })
    }

    async fn delete_exceptional_date(
        &self,
        doctor_id: Uuid,
        exception_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let path = format!(
            "/rest/v1/doctor_exceptional_dates?id=eq.{}&doctor_id=eq.{}",
            exception_id, doctor_id
        );
        let removed: Vec<serde_json::Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                None,
                Some(SupabaseClient::representation_headers()),
            )
            .await?;

        debug!("Deleted {} exceptional date rows", removed.len());
        Ok(!removed.is_empty())
    }
}
