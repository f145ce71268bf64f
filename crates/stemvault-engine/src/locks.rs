//! Per-project write serialization
//!
//! Commit, restore, merge and ingest on one project run one at a time;
//! different projects never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of one async mutex per project id
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, project_id: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive write access to `project_id`. Access lasts until
    /// the guard is dropped.
    pub async fn acquire(&self, project_id: &str) -> OwnedMutexGuard<()> {
        let slot = self.slot(project_id);
        if slot.try_lock().is_err() {
            tracing::debug!(project_id, "Waiting for project write lock");
        }
        slot.lock_owned().await
    }

    /// Number of projects that have ever been locked
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
