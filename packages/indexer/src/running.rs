// ABOUTME: Registry of index ids currently being processed by this process
// ABOUTME: Entries are released by a guard so every exit path unregisters the id

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct RunningIndexes {
    ids: Mutex<BTreeSet<i64>>,
}

impl RunningIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` until the returned guard is dropped
    pub fn track(self: &Arc<Self>, id: i64) -> RunningGuard {
        self.lock().insert(id);
        RunningGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Ids in ascending order
    pub fn ids(&self) -> Vec<i64> {
        self.lock().iter().copied().collect()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.lock().contains(&id)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<i64>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[must_use = "the id is unregistered as soon as the guard is dropped"]
pub struct RunningGuard {
    registry: Arc<RunningIndexes>,
    id: i64,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}
