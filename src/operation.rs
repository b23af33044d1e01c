//! Runs cache operations against single entries.
//!
//! Every operation is a [`Semantic`] driven through the same protocol: it
//! examines the entry without locking it and, when it asks for a mutation,
//! examines it again while holding the processing right of the entry, then
//! updates it. A requested load calls the loader while that right is held so
//! that a key is loaded by at most one thread at a time. The commit step
//! publishes the new state, releases the right, lets the eviction engine
//! catch up and finally sends the removal notifications.

pub(crate) mod operations;
pub mod processor;
pub mod progress;
pub mod semantic;

use std::{
    any::Any,
    borrow::Borrow,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use crate::{
    common::{
        error::{CacheError, IntegrityError},
        time::{Clock, Instant},
    },
    entry::{Entry, ProcessingGuard, ValueOrError},
    eviction::Eviction,
    expiry::ExpiryTime,
    loader::Loader,
    notification::{
        notifier::{PendingNotifications, RemovalNotifier},
        RemovalCause,
    },
    stats::{stats_counter::StatsCounter, EvictionMetrics},
    table::{CollisionInfo, ConcurrentTable},
};

#[cfg(feature = "logging")]
use crate::common::{self, error::PanicError};

use self::{
    progress::{Access, ExaminationEntry, Mutation, Progress},
    semantic::{Semantic, SemanticKind},
};

/// Makes the owned key of an entry that is about to be created.
pub(crate) type KeyMaker<'a, K> = &'a dyn Fn() -> Arc<K>;

enum LoadResult {
    Loaded,
    Failed(CacheError),
    Panicked(Box<dyn Any + Send + 'static>),
}

pub(crate) struct OperationEngine<K, V> {
    table: Arc<ConcurrentTable<K, V>>,
    eviction: Eviction<K, V>,
    loader: Option<Arc<dyn Loader<K, V>>>,
    expire_after_write: Option<Duration>,
    clock: Clock,
    stats: Arc<dyn StatsCounter>,
    notifier: Option<Arc<RemovalNotifier<K, V>>>,
    #[cfg(feature = "logging")]
    cache_name: Option<String>,
}

impl<K, V> OperationEngine<K, V> {
    // https://rust-lang.github.io/rust-clippy/master/index.html#too_many_arguments
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        table: Arc<ConcurrentTable<K, V>>,
        eviction: Eviction<K, V>,
        loader: Option<Arc<dyn Loader<K, V>>>,
        expire_after_write: Option<Duration>,
        clock: Clock,
        stats: Arc<dyn StatsCounter>,
        notifier: Option<Arc<RemovalNotifier<K, V>>>,
        _cache_name: Option<String>,
    ) -> Self {
        Self {
            table,
            eviction,
            loader,
            expire_after_write,
            clock,
            stats,
            notifier,
            #[cfg(feature = "logging")]
            cache_name: _cache_name,
        }
    }

    pub(crate) fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    pub(crate) fn stats(&self) -> &dyn StatsCounter {
        &*self.stats
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.table.is_closed()
    }

    pub(crate) fn entry_count(&self) -> u64 {
        self.table.size() as u64
    }

    pub(crate) fn eviction_metrics(&self) -> EvictionMetrics {
        self.eviction.metrics()
    }

    pub(crate) fn collision_info(&self) -> Result<CollisionInfo, CacheError> {
        self.table.collision_info()
    }

    #[cfg(test)]
    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }
}

impl<K, V> OperationEngine<K, V>
where
    K: Eq + 'static,
    V: Clone + 'static,
{
    /// Runs the semantic against the entry of `key`.
    ///
    /// `make_key` is only called when the semantic needs to create the entry.
    /// Without it, an absent entry is seen as absent by every step.
    pub(crate) fn execute<Q, S>(
        &self,
        key: &Q,
        hash: u64,
        make_key: Option<KeyMaker<'_, K>>,
        semantic: &mut S,
    ) -> Result<S::Output, CacheError>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        S: Semantic<K, V>,
    {
        let kind = semantic.kind();
        loop {
            let found = self.table.lookup(key, hash)?;

            if kind != SemanticKind::Update {
                let now = self.clock.now();
                let view = found.as_deref();
                let mut c = Progress::new(view, now);
                semantic.examine(&mut c, &ExaminationEntry::new(view, now));
                if kind == SemanticKind::Read || !c.wants_mutation() {
                    return self.finish(c, view);
                }
            }

            match found {
                Some(entry) => {
                    let Some(guard) = entry.start_processing() else {
                        // Removed while we were waiting. The key may have a new
                        // entry by now.
                        continue;
                    };
                    return self.mutate(semantic, &entry, guard, false);
                }
                None => {
                    let Some(make_key) = make_key else {
                        return self.run_absent(semantic);
                    };
                    let fresh = Arc::new(Entry::new_processing(make_key(), hash));
                    let (entry, inserted) = self.table.insert_if_absent(fresh)?;
                    if !inserted {
                        continue;
                    }
                    let guard = ProcessingGuard::adopt(&entry);
                    let eviction_needed = self.eviction.submit_without_eviction(&entry);
                    self.table.check_expand(hash);
                    return self.mutate(semantic, &entry, guard, eviction_needed);
                }
            }
        }
    }

    fn mutate<S>(
        &self,
        semantic: &mut S,
        entry: &Arc<Entry<K, V>>,
        guard: ProcessingGuard<'_, K, V>,
        eviction_needed: bool,
    ) -> Result<S::Output, CacheError>
    where
        S: Semantic<K, V>,
    {
        let mut now = self.clock.now();
        let mut c = Progress::new(Some(&**entry), now);
        let mut pending = PendingNotifications::default();

        let mut wants_update = true;
        if semantic.kind() != SemanticKind::Update {
            // The unlocked examination may be stale by now.
            semantic.examine(&mut c, &ExaminationEntry::new(Some(&**entry), now));
            wants_update = c.wants_mutation();
        }
        if wants_update {
            semantic.update(&mut c, &ExaminationEntry::new(Some(&**entry), now));
        }

        while let Some(mutation) = c.take_mutation() {
            match mutation {
                Mutation::Put(value) => {
                    self.store(entry, ValueOrError::Value(value), now, &mut pending);
                    self.stats.record_puts(1);
                }
                Mutation::Remove => self.remove(entry, now, &mut pending)?,
                Mutation::Expire(expiry) => self.expire(entry, expiry, now, &mut pending)?,
                Mutation::Load { refresh } => match self.load(entry, refresh, &mut pending) {
                    LoadResult::Loaded => {
                        now = self.clock.now();
                        c.mark_loaded(now);
                        let e = ExaminationEntry::new(Some(&**entry), now);
                        if c.take_restart() {
                            c.clear_outcome();
                            semantic.update(&mut c, &e);
                        } else {
                            semantic.loaded(&mut c, &e);
                        }
                    }
                    LoadResult::Failed(error) => c.failure(error),
                    LoadResult::Panicked(payload) => {
                        self.commit(entry, guard, now, pending, eviction_needed);
                        resume_unwind(payload);
                    }
                },
            }
        }

        self.commit(entry, guard, now, pending, eviction_needed);
        if self.table.is_closed() {
            return Err(CacheError::Closed);
        }
        self.finish(c, Some(&**entry))
    }

    /// Runs the update step of a semantic that found no entry and cannot
    /// create one. Only removals and expiries may be requested; both are
    /// no-ops on an absent entry.
    fn run_absent<S>(&self, semantic: &mut S) -> Result<S::Output, CacheError>
    where
        S: Semantic<K, V>,
    {
        let now = self.clock.now();
        let mut c = Progress::new(None, now);
        semantic.update(&mut c, &ExaminationEntry::new(None, now));
        match c.take_mutation() {
            None | Some(Mutation::Remove) | Some(Mutation::Expire(_)) => {}
            Some(_) => unreachable!("Bug: a mutation of an absent entry needs an owned key"),
        }
        self.finish(c, None)
    }

    /// Publishes the state of the entry and releases its processing right.
    fn commit(
        &self,
        entry: &Arc<Entry<K, V>>,
        guard: ProcessingGuard<'_, K, V>,
        now: Instant,
        mut pending: PendingNotifications<K, V>,
        mut eviction_needed: bool,
    ) {
        if entry.is_virgin() {
            // Nothing was stored.
            let _ = self.table.remove(entry);
            entry.set_gone();
        } else if entry.is_time_expired(now) {
            self.notify_later(&mut pending, entry, RemovalCause::Expired);
            self.stats.record_eviction(RemovalCause::Expired);
            entry.set_expired();
            let _ = self.table.remove(entry);
            entry.set_gone();
        }
        drop(guard);

        if entry.is_gone() {
            eviction_needed |= self.eviction.submit_without_eviction(entry);
        }
        if eviction_needed {
            self.eviction.evict_eventually();
        }
        pending.send(self.notifier.as_deref());
    }

    fn finish<R>(
        &self,
        c: Progress<'_, K, V, R>,
        entry: Option<&Entry<K, V>>,
    ) -> Result<R, CacheError> {
        match c.access() {
            Access::Hit => {
                self.stats.record_hits(1);
                if let Some(entry) = entry {
                    entry.record_hit();
                }
            }
            Access::Miss => self.stats.record_misses(1),
            Access::None => {}
        }

        let outcome = c
            .into_outcome()
            .expect("Bug: the operation ended without a result");

        #[cfg(feature = "logging")]
        if let Err(CacheError::Processing(error)) = &outcome {
            if let Some(panic) = (**error).downcast_ref::<PanicError>() {
                log::error!(
                    "{}A user function {}",
                    common::log_prefix(self.cache_name.as_deref()),
                    panic
                );
            }
        }

        outcome
    }

    // Mutations. All of them run while the processing right of the entry is
    // held.

    fn store(
        &self,
        entry: &Entry<K, V>,
        value: ValueOrError<V>,
        now: Instant,
        pending: &mut PendingNotifications<K, V>,
    ) {
        let cause = if entry.is_present(now) || entry.is_in_refresh_probation() {
            Some(RemovalCause::Replaced)
        } else if entry.is_time_expired(now) {
            self.stats.record_eviction(RemovalCause::Expired);
            Some(RemovalCause::Expired)
        } else {
            None
        };

        let old = entry.set_value_or_error(value);
        if let (Some(cause), Some(ValueOrError::Value(old)), true) =
            (cause, old, self.notifier.is_some())
        {
            pending.push(Arc::clone(entry.key_arc()), old, cause);
        }
        entry.set_present_until(self.expire_after_write.map(|d| now.saturating_add(d)));
    }

    fn remove(
        &self,
        entry: &Entry<K, V>,
        now: Instant,
        pending: &mut PendingNotifications<K, V>,
    ) -> Result<(), CacheError> {
        let cause = if entry.is_time_expired(now) {
            self.stats.record_eviction(RemovalCause::Expired);
            entry.set_expired();
            RemovalCause::Expired
        } else {
            RemovalCause::Explicit
        };
        if self.table.remove(entry)? {
            self.notify_later(pending, entry, cause);
        }
        entry.set_gone();
        Ok(())
    }

    fn expire(
        &self,
        entry: &Entry<K, V>,
        expiry: ExpiryTime,
        now: Instant,
        pending: &mut PendingNotifications<K, V>,
    ) -> Result<(), CacheError> {
        let present = entry.is_present(now);
        let expiry = match expiry {
            ExpiryTime::Refresh if self.loader.is_none() => ExpiryTime::NoCache,
            other => other,
        };

        match expiry {
            _ if expiry.is_no_cache() => {
                if present || entry.is_in_refresh_probation() {
                    self.notify_later(pending, entry, RemovalCause::Expired);
                    self.stats.record_eviction(RemovalCause::Expired);
                    entry.set_expired();
                    self.table.remove(entry)?;
                    entry.set_gone();
                }
            }
            ExpiryTime::Refresh => {
                if present {
                    entry.set_refresh_probation();
                }
            }
            ExpiryTime::Eternal if present => entry.set_present_until(None),
            ExpiryTime::After(d) if present => {
                entry.set_present_until(Some(now.saturating_add(d)));
            }
            _ => {}
        }
        Ok(())
    }

    fn load(
        &self,
        entry: &Entry<K, V>,
        refresh: bool,
        pending: &mut PendingNotifications<K, V>,
    ) -> LoadResult {
        let Some(loader) = &self.loader else {
            return LoadResult::Failed(CacheError::LoaderNotConfigured);
        };

        let start = self.clock.fast_now();
        let result = catch_unwind(AssertUnwindSafe(|| loader.load(entry.key())));
        let load_time = Instant::duration_to_saturating_nanoseconds(
            self.clock.fast_now().saturating_duration_since(start),
        );
        let now = self.clock.now();

        match result {
            Ok(Ok(value)) => {
                self.stats.record_load_success(load_time, refresh);
                self.store(entry, ValueOrError::Value(value), now, pending);
                LoadResult::Loaded
            }
            Ok(Err(error)) => {
                self.stats.record_load_failure(load_time);
                #[cfg(feature = "logging")]
                log::warn!(
                    "{}The loader failed and the failure was stored in the entry: {}",
                    common::log_prefix(self.cache_name.as_deref()),
                    error
                );
                self.store(entry, ValueOrError::Failure(Arc::clone(&error)), now, pending);
                LoadResult::Failed(CacheError::Loader(error))
            }
            Err(payload) => LoadResult::Panicked(payload),
        }
    }

    fn notify_later(
        &self,
        pending: &mut PendingNotifications<K, V>,
        entry: &Entry<K, V>,
        cause: RemovalCause,
    ) {
        if self.notifier.is_some() {
            pending.push_entry(entry, cause);
        }
    }

    // Whole-table operations

    /// Removes every entry. Entries that held a value are reported as
    /// explicitly removed.
    pub(crate) fn clear(&self) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut pending = PendingNotifications::default();
        self.eviction.run_locked(|state| {
            let entries = self.table.clear()?;
            for entry in &entries {
                if entry.is_present(now) || entry.is_in_refresh_probation() {
                    self.notify_later(&mut pending, entry, RemovalCause::Explicit);
                }
                entry.set_gone();
            }
            state.reset();
            Ok::<_, CacheError>(())
        })?;
        pending.send(self.notifier.as_deref());
        Ok(())
    }

    /// Drops every entry without notifying them. Every later operation fails
    /// with `CacheError::Closed`.
    pub(crate) fn close(&self) {
        self.eviction.run_locked(|state| {
            for entry in self.table.close() {
                entry.set_gone();
            }
            state.reset();
        });
    }

    /// Compares the entry counts kept by the table and by the replacement
    /// strategy with a full scan of the table. Only meaningful while no
    /// operation is running.
    pub(crate) fn check_integrity(&self) -> Result<(), IntegrityError> {
        self.eviction.run_locked(|state| {
            let scanned = self.table.calc_entry_count()?;
            let tracked = self.table.size();
            let replacement = state.len();
            if scanned != tracked || tracked != replacement {
                return Err(IntegrityError::SizeMismatch {
                    scanned,
                    tracked,
                    replacement,
                });
            }
            match self.table.duplicated_keys()? {
                0 => Ok(()),
                n => Err(IntegrityError::DuplicateKeys(n)),
            }
        })
    }
}
