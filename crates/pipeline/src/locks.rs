//! Per-project checkout locks.
//!
//! Every project has one local checkout shared by all of its jobs. The
//! lock for a project is held across source sync *and* the pipeline run,
//! so two jobs of the same project never touch the checkout at the same
//! time. Jobs of different projects do not contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of one async mutex per project name.
#[derive(Debug, Default)]
pub struct CheckoutLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CheckoutLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `project`'s checkout.
    pub async fn acquire(&self, project: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(project.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of projects that have been locked at least once.
    pub fn tracked_projects(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
