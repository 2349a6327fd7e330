// libs/appointment-cell/src/services/lifecycle.rs
use std::fmt;

use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Operations that are gated by the appointment's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOperation {
    Update,
    Confirm,
    Cancel,
    Reschedule,
    Complete,
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleOperation::Update => write!(f, "update"),
            LifecycleOperation::Confirm => write!(f, "confirm"),
            LifecycleOperation::Cancel => write!(f, "cancel"),
            LifecycleOperation::Reschedule => write!(f, "reschedule"),
            LifecycleOperation::Complete => write!(f, "complete"),
        }
    }
}

/// The appointment state machine.
///
/// ```text
/// Scheduled --confirm--> Confirmed --complete--> Completed
///     |                      |
///     +------cancel----------+--> Cancelled
///     +-----reschedule-------+--> Rescheduled (a new Scheduled row replaces it)
/// ```
///
/// Completed, Cancelled and Rescheduled are terminal.
pub struct AppointmentLifecycle;

impl AppointmentLifecycle {
    /// Status the appointment ends up in, or `InvalidTransition`.
    pub fn transition(
        current: AppointmentStatus,
        operation: LifecycleOperation,
    ) -> Result<AppointmentStatus, AppointmentError> {
        use AppointmentStatus::*;
        use LifecycleOperation::*;

        let next = match (current, operation) {
            (Scheduled | Confirmed, Update) => Some(current),
            (Scheduled, Confirm) => Some(Confirmed),
            (Scheduled | Confirmed, Cancel) => Some(Cancelled),
            (Scheduled | Confirmed, Reschedule) => Some(Rescheduled),
            (Confirmed, Complete) => Some(Completed),
            _ => None,
        };

        match next {
            Some(next) => {
                debug!("Transition {} --{}--> {}", current, operation, next);
                Ok(next)
            }
            None => {
                warn!("Rejected {} on {} appointment", operation, current);
                Err(AppointmentError::InvalidTransition {
                    status: current,
                    operation: operation.to_string(),
                })
            }
        }
    }

    /// Operations permitted from `current`, in a stable order.
    pub fn allowed_operations(current: AppointmentStatus) -> Vec<LifecycleOperation> {
        [
            LifecycleOperation::Update,
            LifecycleOperation::Confirm,
            LifecycleOperation::Cancel,
            LifecycleOperation::Reschedule,
            LifecycleOperation::Complete,
        ]
        .into_iter()
        .filter(|op| Self::transition(current, *op).is_ok())
        .collect()
    }
}
