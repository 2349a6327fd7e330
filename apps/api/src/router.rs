use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::{appointment_routes, AppointmentCellState};
use appointment_cell::services::AppointmentBookingService;
use doctor_cell::router::{doctor_routes, DoctorCellState};
use doctor_cell::services::ScheduleService;
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    schedules: Arc<ScheduleService>,
    bookings: Arc<AppointmentBookingService>,
) -> Router {
    let doctors = Arc::new(DoctorCellState {
        config: config.clone(),
        schedules,
    });
    let appointments = Arc::new(AppointmentCellState { config, bookings });

    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/doctors", doctor_routes(doctors))
        .nest("/appointments", appointment_routes(appointments))
}
