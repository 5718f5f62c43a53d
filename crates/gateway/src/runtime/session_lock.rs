//! Per-conversation concurrency control.
//!
//! Only one turn runs per conversation at a time. A second submission
//! arriving while a turn is in flight is rejected, not queued: history is
//! read at invocation time, so a queued turn would be built on a transcript
//! the participant has not seen yet.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Each key maps to a `Semaphore(1)`; holding the permit is holding the
/// conversation.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Take the lock for `key` without waiting. The permit releases on drop.
    pub fn try_acquire(&self, key: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        // The permit is taken under the map lock so `prune_idle` can never
        // drop the semaphore between lookup and acquire.
        let mut locks = self.locks.lock();
        let sem = locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();
        sem.try_acquire_owned().map_err(|_| SessionBusy)
    }

    /// Number of tracked keys (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop semaphores nobody holds. A live permit keeps its own `Arc`, so
    /// a sole reference means the key is idle.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("a turn is already in progress for this conversation")]
pub struct SessionBusy;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let map = SessionLockMap::new();
        let permit = map.try_acquire("c1").unwrap();
        assert!(map.try_acquire("c1").is_err());
        drop(permit);
        assert!(map.try_acquire("c1").is_ok());
    }

    #[test]
    fn different_keys_are_independent() {
        let map = SessionLockMap::new();
        let _a = map.try_acquire("c1").unwrap();
        let _b = map.try_acquire("c2").unwrap();
        assert_eq!(map.session_count(), 2);
    }

    #[test]
    fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let held = map.try_acquire("held").unwrap();
        drop(map.try_acquire("idle").unwrap());
        map.prune_idle();
        assert_eq!(map.session_count(), 1);
        assert!(map.try_acquire("held").is_err());
        drop(held);
    }

    #[test]
    fn pruning_alongside_acquires_never_admits_two_holders() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let map = SessionLockMap::new();
        let holders = AtomicUsize::new(0);
        let overlaps = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..2000 {
                        if let Ok(permit) = map.try_acquire("c1") {
                            if holders.fetch_add(1, Ordering::SeqCst) > 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            std::thread::yield_now();
                            holders.fetch_sub(1, Ordering::SeqCst);
                            drop(permit);
                        }
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..2000 {
                    map.prune_idle();
                    std::thread::yield_now();
                }
            });
        });

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
