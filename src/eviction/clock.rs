use std::sync::Arc;

use super::strategy::{Entry, ReplacementStrategy};
use crate::common::deque::Deque;

/// Second chance eviction. The front of the ring is the clock hand; an entry
/// that was hit since the hand last passed it is skipped once.
pub struct ClockStrategy<K, V> {
    ring: Deque<Arc<Entry<K, V>>>,
}

impl<K, V> Default for ClockStrategy<K, V> {
    fn default() -> Self {
        Self {
            ring: Deque::default(),
        }
    }
}

impl<K, V> ReplacementStrategy<K, V> for ClockStrategy<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn name(&self) -> &'static str {
        "CLOCK"
    }

    fn insert(&mut self, entry: &Arc<Entry<K, V>>) {
        entry.take_hits();
        let slot = self.ring.push_back(Arc::clone(entry));
        entry.set_replacement_slot(slot);
    }

    fn remove(&mut self, entry: &Entry<K, V>) {
        if let Some(slot) = entry.replacement_slot() {
            self.ring.unlink(slot);
        }
    }

    fn find_eviction_candidate(&mut self, _hint: Option<&Entry<K, V>>) -> Option<Arc<Entry<K, V>>> {
        // After one full turn every hit counter is cleared, so the scan ends
        // within `len + 1` steps.
        for _ in 0..=self.ring.len() {
            let entry = Arc::clone(self.ring.peek_front()?);
            self.ring.move_front_to_back();
            if entry.take_hits() == 0 {
                return Some(entry);
            }
        }
        self.ring.peek_front().cloned()
    }

    fn len(&self) -> usize {
        self.ring.len()
    }

    fn clear(&mut self) -> Vec<Arc<Entry<K, V>>> {
        self.ring.drain()
    }
}
