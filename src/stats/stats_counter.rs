use super::CacheStats;
use crate::notification::RemovalCause;

use crossbeam_utils::atomic::AtomicCell;

pub(crate) fn saturating_add(counter: &AtomicCell<u64>, value: u64) {
    let mut v0 = counter.load();
    loop {
        let v1 = v0.saturating_add(value);
        match counter.compare_exchange(v0, v1) {
            Ok(_) => break,
            Err(v2) => v0 = v2,
        }
    }
}

pub(crate) trait StatsCounter: Send + Sync {
    #[allow(unused_variables)]
    fn record_hits(&self, count: u32) {}

    #[allow(unused_variables)]
    fn record_misses(&self, count: u32) {}

    #[allow(unused_variables)]
    fn record_puts(&self, count: u32) {}

    #[allow(unused_variables)]
    fn record_load_success(&self, load_time_nanos: u64, is_refresh: bool) {}

    #[allow(unused_variables)]
    fn record_load_failure(&self, load_time_nanos: u64) {}

    #[allow(unused_variables)]
    fn record_eviction(&self, cause: RemovalCause) {}

    fn snapshot(&self) -> CacheStats;
}

/// A `StatsCounter` that does not record any cache events.
#[derive(Default)]
pub(crate) struct DisabledStatsCounter;

impl StatsCounter for DisabledStatsCounter {
    fn snapshot(&self) -> CacheStats {
        // Return a `CacheStats` with all fields set to 0.
        CacheStats::default()
    }
}

#[derive(Default)]
pub(crate) struct DefaultStatsCounter {
    hit_count: AtomicCell<u64>,
    miss_count: AtomicCell<u64>,
    put_count: AtomicCell<u64>,
    load_success_count: AtomicCell<u64>,
    load_failure_count: AtomicCell<u64>,
    refresh_count: AtomicCell<u64>,
    total_load_time: AtomicCell<u64>,
    eviction_by_size_count: AtomicCell<u64>,
    eviction_by_expiration_count: AtomicCell<u64>,
}

impl StatsCounter for DefaultStatsCounter {
    fn record_hits(&self, count: u32) {
        saturating_add(&self.hit_count, count as u64);
    }

    fn record_misses(&self, count: u32) {
        saturating_add(&self.miss_count, count as u64);
    }

    fn record_puts(&self, count: u32) {
        saturating_add(&self.put_count, count as u64);
    }

    fn record_load_success(&self, load_time_nanos: u64, is_refresh: bool) {
        saturating_add(&self.load_success_count, 1);
        saturating_add(&self.total_load_time, load_time_nanos);
        if is_refresh {
            saturating_add(&self.refresh_count, 1);
        }
    }

    fn record_load_failure(&self, load_time_nanos: u64) {
        saturating_add(&self.load_failure_count, 1);
        saturating_add(&self.total_load_time, load_time_nanos);
    }

    /// Increments the eviction counts only when the `cause` is `Expired` or
    /// `Size`.
    fn record_eviction(&self, cause: RemovalCause) {
        match cause {
            RemovalCause::Size => saturating_add(&self.eviction_by_size_count, 1),
            RemovalCause::Expired => saturating_add(&self.eviction_by_expiration_count, 1),
            _ => (),
        }
    }

    fn snapshot(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        stats
            .set_req_counts(self.hit_count.load(), self.miss_count.load())
            .set_put_count(self.put_count.load())
            .set_load_counts(
                self.load_success_count.load(),
                self.load_failure_count.load(),
                self.refresh_count.load(),
                self.total_load_time.load(),
            )
            .set_eviction_counts(
                self.eviction_by_size_count.load(),
                self.eviction_by_expiration_count.load(),
            );
        stats
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_utils::atomic::AtomicCell;

    use super::{saturating_add, DefaultStatsCounter, DisabledStatsCounter, StatsCounter};
    use crate::notification::RemovalCause;

    #[test]
    fn saturates() {
        let counter = AtomicCell::new(u64::MAX - 1);
        saturating_add(&counter, 5);
        assert_eq!(counter.load(), u64::MAX);
    }

    #[test]
    fn default_counter_records() {
        let counter = DefaultStatsCounter::default();
        counter.record_hits(2);
        counter.record_misses(1);
        counter.record_puts(1);
        counter.record_load_success(10, false);
        counter.record_load_success(20, true);
        counter.record_load_failure(30);
        counter.record_eviction(RemovalCause::Size);
        counter.record_eviction(RemovalCause::Explicit);

        let stats = counter.snapshot();
        assert_eq!(stats.hit_count(), 2);
        assert_eq!(stats.miss_count(), 1);
        assert_eq!(stats.put_count(), 1);
        assert_eq!(stats.load_success_count(), 2);
        assert_eq!(stats.refresh_count(), 1);
        assert_eq!(stats.load_failure_count(), 1);
        assert_eq!(stats.total_load_time(), 60);
        assert_eq!(stats.eviction_count(), 1);
        assert_eq!(stats.expiration_count(), 0);
    }

    #[test]
    fn disabled_counter_ignores_events() {
        let counter = DisabledStatsCounter;
        counter.record_hits(2);
        assert_eq!(counter.snapshot(), Default::default());
    }
}
