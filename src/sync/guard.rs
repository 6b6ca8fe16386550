use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Per-target async locks serializing like/unlike calls for the same item.
/// Calls for different targets never wait on each other.
#[derive(Default)]
pub struct TargetLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, target_event_id: &str) -> TargetGuard<'_> {
        let lock = self
            .locks
            .lock()
            .entry(target_event_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        TargetGuard {
            locks: self,
            target_event_id: target_event_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of targets with a held or awaited lock.
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

pub struct TargetGuard<'a> {
    locks: &'a TargetLocks,
    target_event_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        // Release the async lock before deciding whether the entry is idle.
        self.guard.take();
        let mut locks = self.locks.locks.lock();
        if let Some(lock) = locks.get(&self.target_event_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.target_event_id);
            }
        }
    }
}
