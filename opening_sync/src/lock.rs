//! In-process invocation lock with TTL.
//!
//! One entry per [`SyncTarget`]. Acquisition never blocks: a held, unexpired
//! entry means "busy, try later". An entry older than the TTL is treated as
//! released, so a crashed invocation cannot wedge a target forever. Long
//! invocations keep their entry alive through [`LockLease::refresh`].
//!
//! This only excludes invocations inside one process. Running several
//! instances against the same database needs a lease row in the store
//! instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::warn;

use crate::target::SyncTarget;

#[derive(Debug, Clone, Copy)]
struct Held {
    acquired: Instant,
    generation: u64,
}

/// Shared lock table; clones refer to the same table.
#[derive(Debug, Clone)]
pub struct InvocationLocks {
    ttl: Duration,
    held: Arc<DashMap<SyncTarget, Held>>,
    generation: Arc<AtomicU64>,
}

impl InvocationLocks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Takes the lock for `target`, or `None` if another invocation holds it.
    pub fn try_acquire(&self, target: &SyncTarget) -> Option<LockGuard> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        match self.held.entry(target.clone()) {
            Entry::Occupied(mut e) => {
                let age = now.saturating_duration_since(e.get().acquired);
                if age < self.ttl {
                    return None;
                }
                warn!(%target, ?age, "taking over expired invocation lock");
                e.insert(Held {
                    acquired: now,
                    generation,
                });
            }
            Entry::Vacant(e) => {
                e.insert(Held {
                    acquired: now,
                    generation,
                });
            }
        }
        Some(LockGuard {
            lease: LockLease {
                held: Arc::clone(&self.held),
                target: target.clone(),
                generation,
            },
        })
    }

    /// True if an unexpired holder exists.
    pub fn is_held(&self, target: &SyncTarget) -> bool {
        self.held
            .get(target)
            .is_some_and(|h| h.acquired.elapsed() < self.ttl)
    }
}

/// Handle that keeps a held entry from expiring. Cheap to clone and `Send`,
/// so a blocking consumer can refresh alongside the async side.
#[derive(Debug, Clone)]
pub struct LockLease {
    held: Arc<DashMap<SyncTarget, Held>>,
    target: SyncTarget,
    generation: u64,
}

impl LockLease {
    /// Restarts the TTL clock. `false` if the entry was taken over or released.
    pub fn refresh(&self) -> bool {
        match self.held.get_mut(&self.target) {
            Some(mut h) if h.generation == self.generation => {
                h.acquired = Instant::now();
                true
            }
            _ => {
                warn!(target = %self.target, "invocation lock lost before refresh");
                false
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Releases the lock on drop, unless a later holder already took it over.
#[derive(Debug)]
pub struct LockGuard {
    lease: LockLease,
}

impl LockGuard {
    pub fn lease(&self) -> &LockLease {
        &self.lease
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let generation = self.lease.generation;
        self.lease
            .held
            .remove_if(&self.lease.target, |_, h| h.generation == generation);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::target::Platform;

    fn target() -> SyncTarget {
        SyncTarget::own(Platform::Lichess, "alice")
    }

    #[test]
    fn second_acquire_is_busy_until_release() {
        let locks = InvocationLocks::new(Duration::from_secs(60));
        let guard = locks.try_acquire(&target()).unwrap();
        assert!(locks.try_acquire(&target()).is_none());
        assert!(locks.is_held(&target()));
        drop(guard);
        assert!(!locks.is_held(&target()));
        assert!(locks.try_acquire(&target()).is_some());
    }

    #[test]
    fn targets_are_independent() {
        let locks = InvocationLocks::new(Duration::from_secs(60));
        let _a = locks.try_acquire(&target()).unwrap();
        let other = SyncTarget::opponent(Platform::Lichess, "alice", "bob");
        assert!(locks.try_acquire(&other).is_some());
    }

    #[test]
    fn stale_lock_is_taken_over_and_old_guard_does_not_release_it() {
        let locks = InvocationLocks::new(Duration::ZERO);
        let stale = locks.try_acquire(&target()).unwrap();
        let fresh = locks.try_acquire(&target()).unwrap();
        drop(stale);
        // the stale guard must not remove the fresh holder's entry
        assert!(locks.held.contains_key(&target()));
        drop(fresh);
        assert!(!locks.held.contains_key(&target()));
    }

    #[test]
    fn refreshed_lock_outlives_its_ttl() {
        let locks = InvocationLocks::new(Duration::from_millis(80));
        let guard = locks.try_acquire(&target()).unwrap();
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(40));
            assert!(guard.lease().refresh());
        }
        assert!(locks.try_acquire(&target()).is_none());
        assert!(locks.is_held(&target()));
    }

    #[test]
    fn refresh_after_takeover_fails() {
        let locks = InvocationLocks::new(Duration::ZERO);
        let stale = locks.try_acquire(&target()).unwrap();
        let fresh = locks.try_acquire(&target()).unwrap();
        assert!(!stale.lease().refresh());
        assert!(fresh.lease().refresh());
        assert_ne!(stale.lease().generation(), fresh.lease().generation());
    }

    #[test]
    fn exactly_one_concurrent_winner() {
        let locks = InvocationLocks::new(Duration::from_secs(60));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let guard = locks.try_acquire(&target());
                    // hold until everyone has tried
                    barrier.wait();
                    guard.is_some()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
