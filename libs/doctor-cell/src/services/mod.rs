pub mod locks;
pub mod resolver;
pub mod schedule;
pub mod store;
pub mod template;

pub use locks::{DoctorGuard, DoctorLocks};
pub use resolver::AvailabilityResolver;
pub use schedule::ScheduleService;
pub use store::{BookingLedger, InMemoryScheduleStore, ScheduleStore, SupabaseScheduleStore};
