//! Per-project serialization
//!
//! Jobs of the same project must not run concurrently: each dispatcher keeps
//! one [`ProjectLocks`] and holds the project's guard for the whole job.
//! Different projects never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

#[derive(Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other job of `project_id` holds the lock
    pub async fn acquire(&self, project_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // drop locks nobody holds or waits on
            locks.retain(|id, lock| *id == project_id || Arc::strong_count(lock) > 1);
            locks.entry(project_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
