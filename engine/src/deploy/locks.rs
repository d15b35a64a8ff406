//! Per-project serialization
//!
//! Deploy, redeploy and undeploy hold a project's guard for their whole
//! sequence. The reconciler uses [`ProjectLocks::try_acquire`] and skips
//! projects that are busy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::project::ProjectId;

/// Guard held while a project's deployment is being changed
pub type ProjectGuard = OwnedMutexGuard<()>;

/// Lock map keyed by project id
#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: ProjectId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Entries only the map refers to are neither held nor awaited
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to a project
    pub async fn acquire(&self, id: ProjectId) -> ProjectGuard {
        self.lock_for(id).lock_owned().await
    }

    /// Exclusive access if nobody holds the project right now
    pub fn try_acquire(&self, id: ProjectId) -> Option<ProjectGuard> {
        self.lock_for(id).try_lock_owned().ok()
    }
}
