use std::{sync::Arc, time::Duration};

use crate::{
    common::{error::CacheError, time::Instant},
    entry::{Entry, ValueOrError},
    expiry::ExpiryTime,
};

/// Whether an operation counted as a hit or a miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    None,
    Hit,
    Miss,
}

/// The mutation requested by the update step of a semantic.
pub(crate) enum Mutation<V> {
    Put(V),
    Remove,
    Load { refresh: bool },
    Expire(ExpiryTime),
}

/// The state of one operation, threaded through the steps of its
/// [`Semantic`](super::semantic::Semantic).
///
/// A semantic declares its intent by calling the commands on this type: at
/// most one of `put`, `remove`, `load`, `refresh` or `expire` per update step,
/// and exactly one of `result` or `failure` before the operation ends.
pub struct Progress<'a, K, V, R> {
    entry: Option<&'a Entry<K, V>>,
    now: Instant,
    outcome: Option<Result<R, CacheError>>,
    mutation: Option<Mutation<V>>,
    wants_mutation: bool,
    restart: bool,
    was_loaded: bool,
    access: Access,
}

impl<'a, K, V, R> Progress<'a, K, V, R> {
    pub(crate) fn new(entry: Option<&'a Entry<K, V>>, now: Instant) -> Self {
        Self {
            entry,
            now,
            outcome: None,
            mutation: None,
            wants_mutation: false,
            restart: false,
            was_loaded: false,
            access: Access::None,
        }
    }

    // Commands

    /// Sets the result of the operation.
    pub fn result(&mut self, result: R) {
        self.outcome = Some(Ok(result));
    }

    /// Ends the operation with an error.
    pub fn failure(&mut self, error: CacheError) {
        self.outcome = Some(Err(error));
    }

    /// Asks for the update step. Only meaningful in `examine`.
    pub fn want_mutation(&mut self) {
        self.wants_mutation = true;
    }

    /// Stores the value in the entry.
    pub fn put(&mut self, value: V) {
        self.set_mutation(Mutation::Put(value));
    }

    /// Removes the entry.
    pub fn remove(&mut self) {
        self.set_mutation(Mutation::Remove);
    }

    /// Loads the value through the loader; `loaded` runs afterwards.
    pub fn load(&mut self) {
        self.set_mutation(Mutation::Load { refresh: false });
    }

    /// Like `load`, but the load is counted as a refresh instead of following
    /// a miss.
    pub fn refresh(&mut self) {
        self.set_mutation(Mutation::Load { refresh: true });
    }

    /// Changes the expiry of the entry.
    pub fn expire(&mut self, expiry: ExpiryTime) {
        self.set_mutation(Mutation::Expire(expiry));
    }

    /// Loads the value, then runs the update step again instead of `loaded`.
    pub(crate) fn load_and_restart(&mut self) {
        self.set_mutation(Mutation::Load { refresh: false });
        self.restart = true;
    }

    fn set_mutation(&mut self, mutation: Mutation<V>) {
        debug_assert!(
            self.mutation.is_none(),
            "an update step may request one mutation only"
        );
        self.mutation = Some(mutation);
    }

    // Queries

    /// The entry holds a value (or a loader failure) that has not expired.
    pub fn is_present(&self) -> bool {
        self.entry.map_or(false, |e| e.is_present(self.now))
    }

    /// Same as `is_present`, and counts the operation as a hit or a miss. An
    /// entry in refresh probation counts as neither.
    pub fn is_present_or_miss(&mut self) -> bool {
        if self.is_present() {
            self.access = Access::Hit;
            true
        } else {
            if !self.is_in_refresh_probation() {
                self.access = Access::Miss;
            }
            false
        }
    }

    pub fn is_present_or_in_refresh_probation(&self) -> bool {
        self.is_present() || self.is_in_refresh_probation()
    }

    pub fn is_in_refresh_probation(&self) -> bool {
        self.entry.map_or(false, |e| e.is_in_refresh_probation())
    }

    /// Returns `true` once the engine loaded a value during this operation.
    pub fn was_loaded(&self) -> bool {
        self.was_loaded
    }

    // Engine side

    pub(crate) fn wants_mutation(&self) -> bool {
        self.wants_mutation
    }

    pub(crate) fn take_mutation(&mut self) -> Option<Mutation<V>> {
        self.mutation.take()
    }

    pub(crate) fn take_restart(&mut self) -> bool {
        std::mem::take(&mut self.restart)
    }

    pub(crate) fn mark_loaded(&mut self, now: Instant) {
        self.was_loaded = true;
        self.now = now;
    }

    pub(crate) fn clear_outcome(&mut self) {
        self.outcome = None;
    }

    pub(crate) fn access(&self) -> Access {
        self.access
    }

    pub(crate) fn into_outcome(self) -> Option<Result<R, CacheError>> {
        self.outcome
    }
}

/// A read-only view of the entry an operation works on.
pub struct ExaminationEntry<'a, K, V> {
    entry: Option<&'a Entry<K, V>>,
    now: Instant,
}

impl<'a, K, V> ExaminationEntry<'a, K, V> {
    pub(crate) fn new(entry: Option<&'a Entry<K, V>>, now: Instant) -> Self {
        Self { entry, now }
    }

    pub(crate) fn entry(&self) -> Option<&'a Entry<K, V>> {
        self.entry
    }

    pub(crate) fn now(&self) -> Instant {
        self.now
    }

    /// Returns `true` if an entry for the key exists in the table, whatever
    /// its state.
    pub fn exists(&self) -> bool {
        self.entry.is_some()
    }

    /// The key, if an entry exists.
    pub fn key(&self) -> Option<&K> {
        self.entry.map(|e| e.key())
    }

    pub(crate) fn key_arc(&self) -> Option<&Arc<K>> {
        self.entry.map(|e| e.key_arc())
    }

    /// A clone of the stored value, or the stored loader failure. `None` if the
    /// entry was never populated. Check the presence with the `Progress`
    /// queries first; an expired entry may still return its old value.
    pub fn value(&self) -> Option<Result<V, CacheError>>
    where
        V: Clone,
    {
        self.entry
            .and_then(|e| e.value_or_error())
            .map(|v| match v {
                ValueOrError::Value(v) => Ok(v),
                ValueOrError::Failure(e) => Err(CacheError::Loader(e)),
            })
    }

    /// The remaining lifetime of a present entry. `None` if it never expires.
    pub fn expires_in(&self) -> Option<Duration> {
        self.entry.and_then(|e| e.expires_in(self.now))
    }
}
