use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::ScheduleService;

pub struct DoctorCellState {
    pub config: Arc<AppConfig>,
    pub schedules: Arc<ScheduleService>,
}

pub fn doctor_routes(state: Arc<DoctorCellState>) -> Router {
    Router::new()
        .route(
            "/{doctor_id}/schedule",
            get(handlers::get_weekly_schedule).put(handlers::set_weekly_schedule),
        )
        .route(
            "/{doctor_id}/exceptions",
            get(handlers::list_exceptional_dates).post(handlers::add_exceptional_date),
        )
        .route(
            "/{doctor_id}/exceptions/{exception_id}",
            delete(handlers::remove_exceptional_date),
        )
        .route("/{doctor_id}/open-intervals", get(handlers::get_open_intervals))
        .route("/{doctor_id}/slots", get(handlers::get_available_slots))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
