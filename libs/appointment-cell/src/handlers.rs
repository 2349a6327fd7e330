// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentSearchQuery, AvailabilityCheckQuery, AvailabilityVerdict,
    CancelAppointmentRequest, CancelledBy, CreateAppointmentRequest, RescheduleAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::router::AppointmentCellState;

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

fn ensure_participant(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    if user.is_admin() || appointment.involves(&user.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Not authorized to access this appointment".to_string(),
        ))
    }
}

fn ensure_treating_doctor(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    if user.is_admin() || (user.is_doctor() && user.is_subject(appointment.doctor_id)) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the treating doctor can do this".to_string(),
        ))
    }
}

fn cancelled_by(user: &User) -> CancelledBy {
    if user.is_admin() {
        CancelledBy::Admin
    } else if user.is_doctor() {
        CancelledBy::Doctor
    } else {
        CancelledBy::Patient
    }
}

/// Non-admins only see their own appointments.
fn scope_search(user: &User, mut query: AppointmentSearchQuery) -> Result<AppointmentSearchQuery, AppError> {
    if user.is_admin() {
        return Ok(query);
    }

    let own_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))?;

    let field = if user.is_doctor() {
        &mut query.doctor_id
    } else {
        &mut query.patient_id
    };
    match *field {
        Some(requested) if requested != own_id => Err(AppError::Forbidden(
            "Not authorized to list these appointments".to_string(),
        )),
        _ => {
            *field = Some(own_id);
            Ok(query)
        }
    }
}

fn listing(appointments: Vec<Appointment>) -> Json<Value> {
    Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    }))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients book for themselves; doctors into their own calendar.
    let is_patient = user.is_subject(request.patient_id);
    let is_doctor = user.is_doctor() && user.is_subject(request.doctor_id);
    if !is_patient && !is_doctor && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to book this appointment".to_string(),
        ));
    }

    let appointment = state.bookings.create_appointment(request).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.bookings.get_appointment(appointment_id).await?;
    ensure_participant(&user, &appointment)?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.bookings.get_appointment(appointment_id).await?;
    ensure_participant(&user, &appointment)?;

    let updated = state.bookings.update_appointment(appointment_id, request).await?;
    Ok(Json(json!(updated)))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.bookings.get_appointment(appointment_id).await?;
    ensure_treating_doctor(&user, &appointment)?;

    let confirmed = state.bookings.confirm_appointment(appointment_id).await?;
    Ok(Json(json!(confirmed)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.bookings.get_appointment(appointment_id).await?;
    ensure_participant(&user, &appointment)?;

    let cancelled = state
        .bookings
        .cancel_appointment(appointment_id, request.reason, cancelled_by(&user))
        .await?;
    Ok(Json(json!(cancelled)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.bookings.get_appointment(appointment_id).await?;
    ensure_participant(&user, &appointment)?;

    let replacement = state
        .bookings
        .reschedule_appointment(appointment_id, request.start_time, request.end_time)
        .await?;
    Ok(Json(json!(replacement)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.bookings.get_appointment(appointment_id).await?;
    ensure_treating_doctor(&user, &appointment)?;

    let completed = state.bookings.complete_appointment(appointment_id).await?;
    Ok(Json(json!(completed)))
}

// ==============================================================================
// AVAILABILITY & LISTINGS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppointmentCellState>>,
    Query(query): Query<AvailabilityCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let verdict = state
        .bookings
        .check_availability(query.doctor_id, query.start, query.end, query.exclude_appointment_id)
        .await?;

    let reason = match &verdict {
        AvailabilityVerdict::Available => None,
        AvailabilityVerdict::OutsideWorkingHours => Some("outside_working_hours"),
        AvailabilityVerdict::SlotTaken { .. } => Some("slot_unavailable"),
    };

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "start": query.start,
        "end": query.end,
        "available": verdict.is_available(),
        "reason": reason
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let query = scope_search(&user, query)?;
    let appointments = state.bookings.search_appointments(&query).await?;
    Ok(listing(appointments))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_subject(doctor_id) {
        return Err(AppError::Forbidden(
            "Not authorized to list this doctor's appointments".to_string(),
        ));
    }

    let appointments = state.bookings.get_by_doctor(doctor_id).await?;
    Ok(listing(appointments))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Path(patient_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_subject(patient_id) {
        return Err(AppError::Forbidden(
            "Not authorized to list this patient's appointments".to_string(),
        ));
    }

    let appointments = state.bookings.get_by_patient(patient_id).await?;
    Ok(listing(appointments))
}
