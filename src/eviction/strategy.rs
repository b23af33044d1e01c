//! The interface between the eviction engine and a replacement policy.

use std::sync::Arc;

pub use crate::entry::Entry;
pub use super::{clock::ClockStrategy, fifo::FifoStrategy};

/// Decides the order in which entries are evicted.
///
/// The eviction engine calls every method while holding its lock, so an
/// implementation needs no synchronization of its own. Each entry offers a
/// replacement slot (see [`Entry::replacement_slot`]) where the strategy can
/// keep the index of its own bookkeeping node.
///
/// An entry is inserted once, when it enters the cache, and removed once,
/// when it leaves it. `find_eviction_candidate` only names an entry; the
/// engine removes it through `remove` once the entry is evicted from the table.
pub trait ReplacementStrategy<K, V>: Send {
    /// A short name, reported by the cache policy.
    fn name(&self) -> &'static str;

    /// Starts tracking the entry.
    fn insert(&mut self, entry: &Arc<Entry<K, V>>);

    /// Stops tracking the entry.
    fn remove(&mut self, entry: &Entry<K, V>);

    /// Names the next entry to evict. `hint` is the candidate returned by the
    /// previous call of the same eviction pass, if any.
    ///
    /// Returning the same entry twice in a pass is allowed; the engine ignores
    /// the duplicate and ends the pass.
    fn find_eviction_candidate(&mut self, hint: Option<&Entry<K, V>>) -> Option<Arc<Entry<K, V>>>;

    /// Number of tracked entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops tracking every entry and returns them.
    fn clear(&mut self) -> Vec<Arc<Entry<K, V>>>;
}
