//! Keeps the number of entries within the capacity bound.
//!
//! Entries are removed in chunks. A pass collects up to `chunk_size`
//! candidates from the replacement strategy while holding the eviction lock,
//! removes them from the table without that lock, then takes the lock again to
//! drop them from the strategy. Candidates that are being processed by an
//! operation, or that are already gone, are skipped.

pub(crate) mod clock;
pub(crate) mod fifo;
pub mod strategy;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    common,
    entry::{Entry, GONE_EXPIRED, GONE_VIRGIN, NOT_INSERTED, REMOVED},
    notification::{
        notifier::{PendingNotifications, RemovalNotifier},
        RemovalCause,
    },
    stats::{stats_counter::StatsCounter, EvictionMetrics},
    table::ConcurrentTable,
};

use self::strategy::ReplacementStrategy;

#[derive(Default)]
struct EvictionCounters {
    new_entry: u64,
    removed: u64,
    expired_removed: u64,
    virgin_removed: u64,
    evicted: u64,
}

pub(crate) struct EvictionState<K, V> {
    strategy: Box<dyn ReplacementStrategy<K, V>>,
    counters: EvictionCounters,
    running_count: usize,
    chunk_reuse: Option<Vec<Arc<Entry<K, V>>>>,
}

impl<K, V> EvictionState<K, V> {
    /// Drops every entry from the replacement strategy and resets the counters.
    ///
    /// The running count is kept since eviction passes that are in flight
    /// will still subtract their share.
    pub(crate) fn reset(&mut self) {
        for entry in self.strategy.clear() {
            entry.mark_removed_from_replacement();
        }
        self.counters = EvictionCounters::default();
    }

    /// Number of entries tracked by the replacement strategy.
    pub(crate) fn len(&self) -> usize {
        self.strategy.len()
    }

    fn remove_eventually(&mut self, entry: &Entry<K, V>) {
        if entry.raw_replacement_slot() == REMOVED {
            return;
        }
        self.strategy.remove(entry);
        entry.mark_removed_from_replacement();
        match entry.state() {
            GONE_EXPIRED => self.counters.expired_removed += 1,
            GONE_VIRGIN => self.counters.virgin_removed += 1,
            _ => self.counters.removed += 1,
        }
    }
}

pub(crate) struct Eviction<K, V> {
    max_size: u64,
    corrected_max_size: u64,
    chunk_size: usize,
    table: Arc<ConcurrentTable<K, V>>,
    notifier: Option<Arc<RemovalNotifier<K, V>>>,
    stats: Arc<dyn StatsCounter>,
    state: Mutex<EvictionState<K, V>>,
    #[cfg(feature = "logging")]
    cache_name: Option<String>,
}

impl<K, V> Eviction<K, V> {
    pub(crate) fn new(
        max_capacity: Option<u64>,
        parallelism: usize,
        strategy: Box<dyn ReplacementStrategy<K, V>>,
        table: Arc<ConcurrentTable<K, V>>,
        notifier: Option<Arc<RemovalNotifier<K, V>>>,
        stats: Arc<dyn StatsCounter>,
        _cache_name: Option<String>,
    ) -> Self {
        let max_size = max_capacity.unwrap_or(u64::MAX);
        // Leave room for the slack terms of `eviction_needed`.
        let corrected_max_size = if max_size == u64::MAX {
            u64::MAX >> 1
        } else {
            max_size
        };

        Self {
            max_size,
            corrected_max_size,
            chunk_size: common::eviction_chunk_size(max_size, parallelism),
            table,
            notifier,
            stats,
            state: Mutex::new(EvictionState {
                strategy,
                counters: EvictionCounters::default(),
                running_count: 0,
                chunk_reuse: None,
            }),
            #[cfg(feature = "logging")]
            cache_name: _cache_name,
        }
    }

    /// Adds an entry that is new to the cache to the replacement strategy, or
    /// drops a gone entry from it. Returns whether the capacity is exceeded.
    pub(crate) fn submit_without_eviction(&self, entry: &Arc<Entry<K, V>>) -> bool {
        let mut state = self.state.lock();
        if entry.raw_replacement_slot() == NOT_INSERTED {
            if entry.is_gone() {
                // Removed from the table (e.g. by `clear`) before it was
                // ever tracked.
                entry.mark_removed_from_replacement();
            } else {
                state.strategy.insert(entry);
                state.counters.new_entry += 1;
            }
        } else if entry.is_gone() {
            state.remove_eventually(entry);
        }
        self.eviction_needed(&state)
    }

    fn eviction_needed(&self, state: &EvictionState<K, V>) -> bool {
        let slack = self.corrected_max_size
            + state.running_count as u64
            + (self.chunk_size / 2) as u64;
        state.strategy.len() as u64 > slack
    }

    /// Runs eviction passes while the capacity is exceeded.
    ///
    /// A pass started while others are running leaves room for what they
    /// collected, so the last pass to finish checks the bound again and keeps
    /// going. Stops early when a pass evicts nothing, as its candidates are
    /// all busy; the next submission retries.
    pub(crate) fn evict_eventually(&self)
    where
        V: Clone,
    {
        while let Some(chunk) = self.fill_chunk() {
            if self.evict_chunk(chunk) == 0 {
                break;
            }
        }
    }

    fn evict_chunk(&self, mut chunk: Vec<Arc<Entry<K, V>>>) -> usize
    where
        V: Clone,
    {
        let filled = chunk.len();

        chunk.retain(|entry| {
            // A closed table has nothing left to evict.
            entry.evict_if_idle(|e| self.table.remove(e).unwrap_or(false))
        });

        let mut pending = PendingNotifications::default();
        if self.notifier.is_some() {
            for entry in &chunk {
                pending.push_entry(entry, RemovalCause::Size);
            }
        }

        let evicted = {
            let mut state = self.state.lock();
            let mut evicted = 0;
            for entry in chunk.drain(..) {
                if entry.raw_replacement_slot() != REMOVED {
                    state.strategy.remove(&entry);
                    entry.mark_removed_from_replacement();
                    state.counters.evicted += 1;
                    evicted += 1;
                }
            }
            state.running_count -= filled;
            state.chunk_reuse = Some(chunk);
            evicted
        };

        for _ in 0..evicted {
            self.stats.record_eviction(RemovalCause::Size);
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "{}Eviction pass collected {} candidates and evicted {}",
            common::log_prefix(self.cache_name.as_deref()),
            filled,
            evicted
        );

        pending.send(self.notifier.as_deref());
        evicted
    }

    fn fill_chunk(&self) -> Option<Vec<Arc<Entry<K, V>>>> {
        let mut state = self.state.lock();
        if !self.eviction_needed(&state) {
            return None;
        }

        let mut chunk = state
            .chunk_reuse
            .take()
            .unwrap_or_else(|| Vec::with_capacity(self.chunk_size));
        let wanted = self.chunk_size.min(state.strategy.len());
        while chunk.len() < wanted {
            let hint = chunk.last().map(|e| &**e);
            let Some(candidate) = state.strategy.find_eviction_candidate(hint) else {
                break;
            };
            if chunk.iter().any(|e| Arc::ptr_eq(e, &candidate)) {
                break;
            }
            chunk.push(candidate);
        }

        if chunk.is_empty() {
            state.chunk_reuse = Some(chunk);
            return None;
        }
        state.running_count += chunk.len();
        Some(chunk)
    }

    /// Runs `job` while holding the eviction lock.
    pub(crate) fn run_locked<T>(&self, job: impl FnOnce(&mut EvictionState<K, V>) -> T) -> T {
        let mut state = self.state.lock();
        job(&mut state)
    }

    pub(crate) fn metrics(&self) -> EvictionMetrics {
        let state = self.state.lock();
        EvictionMetrics {
            new_entry_count: state.counters.new_entry,
            removed_count: state.counters.removed,
            expired_removed_count: state.counters.expired_removed,
            virgin_removed_count: state.counters.virgin_removed,
            evicted_count: state.counters.evicted,
            eviction_running_count: state.running_count,
            max_size: self.max_size,
            chunk_size: self.chunk_size,
            size: state.strategy.len(),
        }
    }
}
