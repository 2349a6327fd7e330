pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod store;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictChecker;
pub use lifecycle::{AppointmentLifecycle, LifecycleOperation};
pub use store::{AppointmentStore, InMemoryAppointmentStore, StoreLedger, SupabaseAppointmentStore};
