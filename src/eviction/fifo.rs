use std::sync::Arc;

use super::strategy::{Entry, ReplacementStrategy};
use crate::common::deque::Deque;

/// Evicts entries in insertion order.
pub struct FifoStrategy<K, V> {
    queue: Deque<Arc<Entry<K, V>>>,
}

impl<K, V> Default for FifoStrategy<K, V> {
    fn default() -> Self {
        Self {
            queue: Deque::default(),
        }
    }
}

impl<K, V> ReplacementStrategy<K, V> for FifoStrategy<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn insert(&mut self, entry: &Arc<Entry<K, V>>) {
        let slot = self.queue.push_back(Arc::clone(entry));
        entry.set_replacement_slot(slot);
    }

    fn remove(&mut self, entry: &Entry<K, V>) {
        if let Some(slot) = entry.replacement_slot() {
            self.queue.unlink(slot);
        }
    }

    fn find_eviction_candidate(&mut self, _hint: Option<&Entry<K, V>>) -> Option<Arc<Entry<K, V>>> {
        let candidate = self.queue.peek_front().cloned();
        // An entry that cannot be evicted right now must not block the ones
        // behind it.
        self.queue.move_front_to_back();
        candidate
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) -> Vec<Arc<Entry<K, V>>> {
        self.queue.drain()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::FifoStrategy;
    use crate::eviction::strategy::{Entry, ReplacementStrategy};

    fn entry(k: u32) -> Arc<Entry<u32, u32>> {
        Arc::new(Entry::new(Arc::new(k), u64::from(k)))
    }

    #[test]
    fn evicts_in_insertion_order() {
        let mut fifo = FifoStrategy::default();
        let entries: Vec<_> = (0..3).map(entry).collect();
        entries.iter().for_each(|e| fifo.insert(e));
        assert_eq!(fifo.len(), 3);

        let first = fifo.find_eviction_candidate(None).unwrap();
        assert_eq!(*first.key(), 0);
        let second = fifo.find_eviction_candidate(Some(&first)).unwrap();
        assert_eq!(*second.key(), 1);

        fifo.remove(&first);
        assert_eq!(fifo.len(), 2);
        assert_eq!(*fifo.find_eviction_candidate(None).unwrap().key(), 2);

        let drained = fifo.clear();
        assert_eq!(drained.len(), 2);
        assert!(fifo.is_empty());
        assert!(fifo.find_eviction_candidate(None).is_none());
    }
}
