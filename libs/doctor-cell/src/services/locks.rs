use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-doctor serialization of schedule and booking mutations.
///
/// Every write that can change what a doctor has free (template, exceptions,
/// bookings) runs while holding the doctor's lock, so a check-then-insert
/// cannot interleave with another write for the same doctor. Different
/// doctors never contend.
#[derive(Debug, Default, Clone)]
pub struct DoctorLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

/// Held for the duration of one mutation; released on drop.
#[derive(Debug)]
pub struct DoctorGuard {
    doctor_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl DoctorGuard {
    pub fn doctor_id(&self) -> Uuid {
        self.doctor_id
    }
}

impl DoctorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, doctor_id: Uuid) -> DoctorGuard {
        let lock = {
            let mut locks = self.inner.lock().await;
            // Entries referenced only by the map have no holder and no waiter.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(doctor_id).or_default().clone()
        };

        DoctorGuard {
            doctor_id,
            _guard: lock.lock_owned().await,
        }
    }
}
