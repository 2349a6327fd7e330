use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Doctor not found: {0}")]
    DoctorNotFound(Uuid),

    #[error("Exceptional date not found: {0}")]
    ExceptionNotFound(Uuid),

    #[error("An exceptional date already exists for {0}")]
    DuplicateException(NaiveDate),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<ScheduleError> for AppError {
    fn from(error: ScheduleError) -> Self {
        match error {
            ScheduleError::DoctorNotFound(_) | ScheduleError::ExceptionNotFound(_) => {
                AppError::NotFound(error.to_string())
            }
            ScheduleError::DuplicateException(_) | ScheduleError::InvalidOperation(_) => {
                AppError::Conflict(error.to_string())
            }
            ScheduleError::Validation(msg) => AppError::ValidationError(msg),
            ScheduleError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}
