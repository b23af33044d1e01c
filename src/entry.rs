//! The record kept for one cached key.
//!
//! The lifecycle of an entry is packed into a single `AtomicU64`. Small values
//! are sentinels, everything from `DATA_VALID` upward means "present" and
//! encodes the instant the value expires (or `ETERNAL`).

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::common::{error::ErrorObject, time::Instant};

pub(crate) const VIRGIN: u64 = 1;
pub(crate) const EXPIRED: u64 = 2;
pub(crate) const REFRESH_PROBATION: u64 = 3;
pub(crate) const GONE: u64 = 4;
pub(crate) const GONE_VIRGIN: u64 = GONE + VIRGIN;
pub(crate) const GONE_EXPIRED: u64 = GONE + EXPIRED;
pub(crate) const DATA_VALID: u64 = 16;
pub(crate) const ETERNAL: u64 = u64::MAX;

// Values of the replacement slot that are owned by the eviction engine. Any
// other value belongs to the active replacement strategy.
pub(crate) const NOT_INSERTED: usize = usize::MAX;
pub(crate) const REMOVED: usize = usize::MAX - 1;

/// What an entry holds once populated: a value, or the failure of the load
/// that tried to produce it.
pub(crate) enum ValueOrError<V> {
    Value(V),
    Failure(ErrorObject),
}

impl<V: Clone> Clone for ValueOrError<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Failure(e) => Self::Failure(Arc::clone(e)),
        }
    }
}

/// A cache entry as seen by a [`ReplacementStrategy`][strategy].
///
/// Strategies may read the key and hash, keep their own bookkeeping index in
/// the replacement slot and consume the hit counter. Everything else is
/// managed by the cache.
///
/// [strategy]: ./trait.ReplacementStrategy.html
pub struct Entry<K, V> {
    key: Arc<K>,
    hash: u64,
    state: AtomicU64,
    value: RwLock<Option<ValueOrError<V>>>,
    // Collision chain link. Owned by the table.
    pub(crate) another: ArcSwapOption<Entry<K, V>>,
    // Only read or written while the eviction lock is held.
    replacement_slot: AtomicUsize,
    hits: AtomicU32,
    processing: Mutex<bool>,
    processing_done: Condvar,
}

impl<K, V> fmt::Debug for Entry<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("hash", &self.hash)
            .field("state", &self.state())
            .finish()
    }
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: Arc<K>, hash: u64) -> Self {
        Self {
            key,
            hash,
            state: AtomicU64::new(VIRGIN),
            value: RwLock::new(None),
            another: ArcSwapOption::const_empty(),
            replacement_slot: AtomicUsize::new(NOT_INSERTED),
            hits: AtomicU32::new(0),
            processing: Mutex::new(false),
            processing_done: Condvar::new(),
        }
    }

    /// Creates a virgin entry whose processing right is already taken. Use
    /// [`ProcessingGuard::adopt`] to release it.
    pub(crate) fn new_processing(key: Arc<K>, hash: u64) -> Self {
        let mut entry = Self::new(key, hash);
        *entry.processing.get_mut() = true;
        entry
    }

    /// Returns a reference to the key.
    pub fn key(&self) -> &K {
        &self.key
    }

    pub(crate) fn key_arc(&self) -> &Arc<K> {
        &self.key
    }

    /// Returns the hash of the key.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns the index the replacement strategy stored in this entry, if
    /// any.
    pub fn replacement_slot(&self) -> Option<usize> {
        match self.replacement_slot.load(Ordering::Relaxed) {
            NOT_INSERTED | REMOVED => None,
            slot => Some(slot),
        }
    }

    /// Stores the strategy's bookkeeping index. `usize::MAX` and
    /// `usize::MAX - 1` are reserved.
    pub fn set_replacement_slot(&self, slot: usize) {
        debug_assert!(slot < REMOVED);
        self.replacement_slot.store(slot, Ordering::Relaxed);
    }

    /// Returns how many times the entry was hit since the last call, resetting
    /// the counter.
    pub fn take_hits(&self) -> u32 {
        self.hits.swap(0, Ordering::Relaxed)
    }

    pub(crate) fn record_hit(&self) {
        let _ = self
            .hits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |h| h.checked_add(1));
    }

    pub(crate) fn raw_replacement_slot(&self) -> usize {
        self.replacement_slot.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_removed_from_replacement(&self) {
        self.replacement_slot.store(REMOVED, Ordering::Relaxed);
    }

    // State

    pub(crate) fn state(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn is_virgin(&self) -> bool {
        self.state() == VIRGIN
    }

    pub(crate) fn is_gone(&self) -> bool {
        is_gone_state(self.state())
    }

    pub(crate) fn is_in_refresh_probation(&self) -> bool {
        self.state() == REFRESH_PROBATION
    }

    pub(crate) fn is_present(&self, now: Instant) -> bool {
        is_present_state(self.state(), now)
    }

    /// Holds data whose expiry time has passed.
    pub(crate) fn is_time_expired(&self, now: Instant) -> bool {
        let s = self.state();
        s >= DATA_VALID && !is_present_state(s, now)
    }

    /// The remaining lifetime, or `None` when the entry is eternal or holds no
    /// data.
    pub(crate) fn expires_in(&self, now: Instant) -> Option<Duration> {
        match self.state() {
            ETERNAL => None,
            s if s >= DATA_VALID => {
                Some(Instant::from_nanos(s - DATA_VALID).saturating_duration_since(now))
            }
            _ => None,
        }
    }

    pub(crate) fn set_present_until(&self, expires_at: Option<Instant>) {
        let state = match expires_at {
            None => ETERNAL,
            Some(t) => DATA_VALID.saturating_add(t.as_nanos()).min(ETERNAL - 1),
        };
        self.store_unless_gone(state);
    }

    pub(crate) fn set_expired(&self) {
        self.store_unless_gone(EXPIRED);
    }

    pub(crate) fn set_refresh_probation(&self) {
        self.store_unless_gone(REFRESH_PROBATION);
    }

    // A gone entry never comes back to life, even when `clear` removed it
    // while an operation was still working on it.
    fn store_unless_gone(&self, state: u64) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (!is_gone_state(s)).then_some(state)
            });
    }

    /// Marks the entry as removed from the table, keeping the information
    /// whether it was virgin or expired at that time.
    pub(crate) fn set_gone(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| match s {
                s if is_gone_state(s) => None,
                s if s < GONE => Some(GONE + s),
                _ => Some(GONE),
            });
    }

    // Value

    pub(crate) fn value_or_error(&self) -> Option<ValueOrError<V>>
    where
        V: Clone,
    {
        self.value.read().clone()
    }

    pub(crate) fn set_value_or_error(&self, value: ValueOrError<V>) -> Option<ValueOrError<V>> {
        self.value.write().replace(value)
    }

    // Processing

    /// Waits until no other operation processes the entry and takes the
    /// processing right. Returns `None` if the entry was removed from the
    /// table in the meantime.
    pub(crate) fn start_processing(&self) -> Option<ProcessingGuard<'_, K, V>> {
        let mut processing = self.processing.lock();
        while *processing {
            self.processing_done.wait(&mut processing);
        }
        if self.is_gone() {
            return None;
        }
        *processing = true;
        Some(ProcessingGuard { entry: self })
    }

    /// Runs `evict` if the entry is neither processed nor gone, then marks it
    /// as gone. Returns whether the entry was evicted.
    pub(crate) fn evict_if_idle(&self, evict: impl FnOnce(&Self) -> bool) -> bool {
        let processing = self.processing.lock();
        if *processing || self.is_gone() {
            return false;
        }
        let removed = evict(self);
        if removed {
            self.set_gone();
        }
        drop(processing);
        removed
    }

    #[cfg(test)]
    pub(crate) fn is_processing(&self) -> bool {
        *self.processing.lock()
    }

    fn processing_lock(&self) -> MutexGuard<'_, bool> {
        self.processing.lock()
    }
}

fn is_gone_state(s: u64) -> bool {
    (GONE..DATA_VALID).contains(&s)
}

fn is_present_state(s: u64, now: Instant) -> bool {
    s == ETERNAL || (s >= DATA_VALID && s - DATA_VALID > now.as_nanos())
}

/// The processing right of an entry. Dropping it wakes up the waiters.
pub(crate) struct ProcessingGuard<'a, K, V> {
    entry: &'a Entry<K, V>,
}

impl<'a, K, V> ProcessingGuard<'a, K, V> {
    /// Takes over the processing right of an entry created by
    /// [`Entry::new_processing`].
    pub(crate) fn adopt(entry: &'a Entry<K, V>) -> Self {
        debug_assert!(*entry.processing_lock());
        Self { entry }
    }
}

impl<K, V> Drop for ProcessingGuard<'_, K, V> {
    fn drop(&mut self) {
        let mut processing = self.entry.processing_lock();
        *processing = false;
        self.entry.processing_done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    fn entry() -> Entry<&'static str, u32> {
        Entry::new(Arc::new("a"), 7)
    }

    #[test]
    fn lifecycle_states() {
        let e = entry();
        let now = Instant::from_nanos(1_000);
        assert!(e.is_virgin());
        assert!(!e.is_present(now));

        e.set_present_until(None);
        assert!(e.is_present(now));
        assert_eq!(e.expires_in(now), None);

        e.set_present_until(Some(Instant::from_nanos(2_000)));
        assert!(e.is_present(now));
        assert_eq!(e.expires_in(now), Some(Duration::from_nanos(1_000)));
        let later = Instant::from_nanos(2_000);
        assert!(!e.is_present(later));
        assert!(e.is_time_expired(later));
        assert!(e.state() >= DATA_VALID);

        e.set_refresh_probation();
        assert!(e.is_in_refresh_probation());
        assert!(!e.is_present(now));

        e.set_expired();
        assert_eq!(e.state(), EXPIRED);
        e.set_gone();
        assert!(e.is_gone());
        assert_eq!(e.state(), GONE_EXPIRED);
    }

    #[test]
    fn gone_remembers_previous_state() {
        let e = entry();
        e.set_gone();
        assert_eq!(e.state(), GONE_VIRGIN);
        // Setting gone twice does not move out of the gone range.
        e.set_gone();
        assert!(e.is_gone());

        let e = entry();
        e.set_present_until(None);
        e.set_gone();
        assert_eq!(e.state(), GONE);
    }

    #[test]
    fn gone_entries_stay_gone() {
        let e = entry();
        e.set_expired();
        e.set_gone();
        e.set_present_until(None);
        e.set_refresh_probation();
        e.set_expired();
        assert_eq!(e.state(), GONE_EXPIRED);
    }

    #[test]
    fn replacement_slot_sentinels() {
        let e = entry();
        assert_eq!(e.replacement_slot(), None);
        assert_eq!(e.raw_replacement_slot(), NOT_INSERTED);
        e.set_replacement_slot(3);
        assert_eq!(e.replacement_slot(), Some(3));
        e.mark_removed_from_replacement();
        assert_eq!(e.replacement_slot(), None);
        assert_eq!(e.raw_replacement_slot(), REMOVED);
    }

    #[test]
    fn hits_are_taken() {
        let e = entry();
        e.record_hit();
        e.record_hit();
        assert_eq!(e.take_hits(), 2);
        assert_eq!(e.take_hits(), 0);
    }

    #[test]
    fn processing_is_exclusive() {
        let e = Arc::new(entry());
        let guard = e.start_processing().expect("not gone");
        assert!(!e.evict_if_idle(|_| true));

        let e2 = Arc::clone(&e);
        let waiter = thread::spawn(move || e2.start_processing().is_some());
        thread::sleep(Duration::from_millis(20));
        assert!(e.is_processing());
        drop(guard);
        assert!(waiter.join().expect("waiter panicked"));
        assert!(!e.is_processing());
    }

    #[test]
    fn gone_entries_cannot_be_processed() {
        let e = entry();
        assert!(e.evict_if_idle(|_| true));
        assert!(e.is_gone());
        assert!(e.start_processing().is_none());
    }

    #[test]
    fn new_processing_is_adopted() {
        let e = Entry::<&str, u32>::new_processing(Arc::new("b"), 1);
        assert!(e.is_processing());
        let guard = ProcessingGuard::adopt(&e);
        drop(guard);
        assert!(!e.is_processing());
    }
}
