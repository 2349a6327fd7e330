pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export the schedule engine for the appointment cell and the binary
pub use error::ScheduleError;
pub use models::*;
pub use router::{doctor_routes, DoctorCellState};
pub use services::*;
