use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AddExceptionalDateRequest, DateRange, SetWeeklyScheduleRequest};
use crate::router::DoctorCellState;

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub from: NaiveDate,
    /// Defaults to `from` for single-day queries.
    pub to: Option<NaiveDate>,
}

impl DateRangeQuery {
    fn range(&self) -> DateRange {
        DateRange::new(self.from, self.to.unwrap_or(self.from))
    }
}

#[derive(Debug, Deserialize)]
pub struct ExceptionListQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Doctors manage their own schedule; admins manage anyone's.
fn ensure_schedule_owner(user: &User, doctor_id: Uuid) -> Result<(), AppError> {
    if user.is_admin() || (user.is_doctor() && user.is_subject(doctor_id)) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the doctor or an admin can change this schedule".to_string(),
        ))
    }
}

// ==============================================================================
// WEEKLY SCHEDULE
// ==============================================================================

#[axum::debug_handler]
pub async fn get_weekly_schedule(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let template = state.schedules.get_weekly_schedule(doctor_id).await?;
    Ok(Json(json!(template)))
}

#[axum::debug_handler]
pub async fn set_weekly_schedule(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<SetWeeklyScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_schedule_owner(&user, doctor_id)?;

    let template = state.schedules.set_weekly_schedule(doctor_id, request).await?;
    Ok(Json(json!(template)))
}

// ==============================================================================
// EXCEPTIONAL DATES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_exceptional_dates(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ExceptionListQuery>,
) -> Result<Json<Value>, AppError> {
    let range = match (query.from, query.to) {
        (Some(from), Some(to)) => Some(DateRange::new(from, to)),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "'from' and 'to' must be given together".to_string(),
            ))
        }
    };

    let exceptions = state.schedules.get_exceptional_dates(doctor_id, range).await?;
    Ok(Json(json!({
        "exceptional_dates": exceptions,
        "total": exceptions.len()
    })))
}

#[axum::debug_handler]
pub async fn add_exceptional_date(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<AddExceptionalDateRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_schedule_owner(&user, doctor_id)?;

    let exception = state.schedules.add_exceptional_date(doctor_id, request).await?;
    Ok(Json(json!(exception)))
}

#[axum::debug_handler]
pub async fn remove_exceptional_date(
    State(state): State<Arc<DoctorCellState>>,
    Path((doctor_id, exception_id)): Path<(Uuid, Uuid)>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_schedule_owner(&user, doctor_id)?;

    let removed = state
        .schedules
        .remove_exceptional_date(doctor_id, exception_id)
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn get_open_intervals(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let range = query.range();
    let intervals = state.schedules.resolve_open_intervals(doctor_id, range).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from": range.from,
        "to": range.to,
        "open_intervals": intervals,
        "total": intervals.len()
    })))
}

/// Bookable slots, with slots already taken by active appointments removed.
#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let range = query.range();
    let slots = state.schedules.available_slots(doctor_id, range).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from": range.from,
        "to": range.to,
        "slots": slots,
        "total": slots.len()
    })))
}
