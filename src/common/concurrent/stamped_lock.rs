//! A read/write lock paired with a version counter, so that readers can walk a
//! structure without blocking and validate afterwards that no writer touched it.
//!
//! The version is even while the lock is free and odd while a writer holds it.
//! A reader snapshots an even version, reads, and then checks that the version
//! is unchanged. On mismatch it falls back to taking the read lock.
//!
//! Everything read under an optimistic stamp must itself be safe to read
//! concurrently with a writer (atomics or `ArcSwap` pointers). The stamp only
//! tells the reader whether what it saw is a consistent view.

use std::sync::atomic::{self, AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub(crate) struct StampedLock {
    version: AtomicU64,
    lock: RwLock<()>,
}

impl StampedLock {
    /// Returns a stamp for an optimistic read, or `None` when a writer is
    /// currently holding the lock.
    #[inline]
    pub(crate) fn try_optimistic_read(&self) -> Option<u64> {
        let stamp = self.version.load(Ordering::Acquire);
        if stamp & 1 == 0 {
            Some(stamp)
        } else {
            None
        }
    }

    /// Returns `true` if no writer acquired the lock since `stamp` was taken.
    #[inline]
    pub(crate) fn validate(&self, stamp: u64) -> bool {
        atomic::fence(Ordering::Acquire);
        self.version.load(Ordering::Relaxed) == stamp
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub(crate) fn write(&self) -> StampedWriteGuard<'_> {
        let guard = self.lock.write();
        self.version.fetch_add(1, Ordering::Relaxed);
        atomic::fence(Ordering::Release);
        StampedWriteGuard {
            version: &self.version,
            _guard: guard,
        }
    }

    #[cfg(test)]
    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Holds the exclusive lock. Dropping it bumps the version back to even and
/// releases the lock.
pub(crate) struct StampedWriteGuard<'a> {
    version: &'a AtomicU64,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Drop for StampedWriteGuard<'_> {
    fn drop(&mut self) {
        self.version.fetch_add(1, Ordering::Release);
    }
}
