// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide sync point bookkeeping.
//!
//! Sync points are issued on command buffers' IPC threads and retired on the
//! GPU thread, so the manager is shared by reference count and serialises
//! through a single mutex. Callbacks registered for a sync point run on the
//! retiring thread, outside the lock.

use std::collections::BTreeSet;
use std::fmt;

use fresco_core::sync::{SyncPoint, SyncPointQuery};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};

type RetireCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Inner {
    next: u32,
    pending: BTreeSet<SyncPoint>,
    callbacks: HashMap<SyncPoint, Vec<RetireCallback>>,
}

/// Issues and retires sync points.
#[derive(Default)]
pub struct SyncPointManager {
    inner: Mutex<Inner>,
    retired: Condvar,
}

impl fmt::Debug for SyncPointManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SyncPointManager")
            .field("next", &inner.next)
            .field("pending", &inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl SyncPointManager {
    /// Creates a manager with no outstanding sync points.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh, unretired sync point.
    ///
    /// Values are strictly increasing and never [`SyncPoint::NONE`].
    pub fn generate_sync_point(&self) -> SyncPoint {
        let mut inner = self.inner.lock();
        inner.next = inner.next.wrapping_add(1);
        if inner.next == 0 {
            inner.next = 1;
        }
        let sync_point = SyncPoint(inner.next);
        inner.pending.insert(sync_point);
        sync_point
    }

    /// Retires `sync_point`, waking waiters and running its callbacks.
    ///
    /// Retiring an unknown or already retired sync point does nothing.
    pub fn retire_sync_point(&self, sync_point: SyncPoint) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if !inner.pending.remove(&sync_point) {
                return;
            }
            inner.callbacks.remove(&sync_point).unwrap_or_default()
        };
        self.retired.notify_all();
        for callback in callbacks {
            callback();
        }
    }

    /// Returns `true` if `sync_point` is not pending.
    #[must_use]
    pub fn is_sync_point_retired(&self, sync_point: SyncPoint) -> bool {
        !self.inner.lock().pending.contains(&sync_point)
    }

    /// Runs `callback` once `sync_point` retires.
    ///
    /// If it already has (or was never issued), the callback runs immediately
    /// on the calling thread.
    pub fn add_sync_point_callback(
        &self,
        sync_point: SyncPoint,
        callback: impl FnOnce() + Send + 'static,
    ) {
        {
            let mut inner = self.inner.lock();
            if inner.pending.contains(&sync_point) {
                inner
                    .callbacks
                    .entry(sync_point)
                    .or_default()
                    .push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Blocks the calling thread until `sync_point` retires.
    pub fn wait(&self, sync_point: SyncPoint) {
        let mut inner = self.inner.lock();
        while inner.pending.contains(&sync_point) {
            self.retired.wait(&mut inner);
        }
    }

    /// Number of issued but unretired sync points.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl SyncPointQuery for SyncPointManager {
    fn is_retired(&self, sync_point: SyncPoint) -> bool {
        self.is_sync_point_retired(sync_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn sync_points_increase_and_start_pending() {
        let manager = SyncPointManager::new();
        let a = manager.generate_sync_point();
        let b = manager.generate_sync_point();
        assert!(a < b);
        assert!(a.is_some());
        assert!(!manager.is_sync_point_retired(a));
        assert_eq!(manager.pending_count(), 2);
    }

    #[test]
    fn retire_runs_callbacks_once() {
        let manager = SyncPointManager::new();
        let sp = manager.generate_sync_point();
        let hits = Arc::new(AtomicU32::new(0));
        {
            let hits = Arc::clone(&hits);
            manager.add_sync_point_callback(sp, move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        manager.retire_sync_point(sp);
        manager.retire_sync_point(sp);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(manager.is_sync_point_retired(sp));
    }

    #[test]
    fn callback_on_retired_point_runs_immediately() {
        let manager = SyncPointManager::new();
        let hits = Arc::new(AtomicU32::new(0));
        let hits2 = Arc::clone(&hits);
        manager.add_sync_point_callback(SyncPoint(77), move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_blocks_until_retired_elsewhere() {
        let manager = Arc::new(SyncPointManager::new());
        let sp = manager.generate_sync_point();
        let retirer = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.retire_sync_point(sp))
        };
        manager.wait(sp);
        retirer.join().expect("retirer thread panicked");
        assert!(manager.is_retired(sp));
    }
}
