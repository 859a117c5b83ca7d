//! Per-name mutual exclusion for lifecycle operations, and the phase
//! each name is in while an operation runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per application name.
#[derive(Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`.
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Drop locks nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// A lifecycle operation in progress on a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Installing,
    Redeploying,
    Removing,
}

type ActivePhases = Arc<Mutex<HashMap<String, Vec<(u64, Phase)>>>>;

/// Operations in progress, by name. Readable without taking the name lock.
///
/// Several operations may be registered on one name at once (one running,
/// others waiting for the lock). The reported phase is the most recently
/// entered one that is still active.
#[derive(Default, Clone)]
pub struct Phases {
    active: ActivePhases,
    next_id: Arc<AtomicU64>,
}

/// Keeps a name in a phase until dropped.
pub struct PhaseGuard {
    active: ActivePhases,
    name: String,
    id: u64,
}

impl Phases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, name: &str, phase: Phase) -> PhaseGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(name.to_string())
            .or_default()
            .push((id, phase));
        PhaseGuard {
            active: Arc::clone(&self.active),
            name: name.to_string(),
            id,
        }
    }

    pub fn get(&self, name: &str) -> Option<Phase> {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .and_then(|entries| entries.last())
            .map(|&(_, phase)| phase)
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entries) = active.get_mut(&self.name) {
            entries.retain(|&(id, _)| id != self.id);
            if entries.is_empty() {
                active.remove(&self.name);
            }
        }
    }
}
