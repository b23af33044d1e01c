pub(crate) mod stats_counter;

/// Operation statistics of a cache. Obtained by [`Cache::stats`][stats]. All
/// counters are zero unless the cache was built with `record_stats`.
///
/// [stats]: ./struct.Cache.html#method.stats
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    hit_count: u64,
    miss_count: u64,
    put_count: u64,
    load_success_count: u64,
    load_failure_count: u64,
    refresh_count: u64,
    total_load_time: u64,
    eviction_count: u64,
    expiration_count: u64,
}

impl CacheStats {
    pub(crate) fn set_req_counts(&mut self, hit_count: u64, miss_count: u64) -> &mut Self {
        self.hit_count = hit_count;
        self.miss_count = miss_count;
        self
    }

    pub(crate) fn set_put_count(&mut self, put_count: u64) -> &mut Self {
        self.put_count = put_count;
        self
    }

    pub(crate) fn set_load_counts(
        &mut self,
        load_success_count: u64,
        load_failure_count: u64,
        refresh_count: u64,
        total_load_time: u64,
    ) -> &mut Self {
        self.load_success_count = load_success_count;
        self.load_failure_count = load_failure_count;
        self.refresh_count = refresh_count;
        self.total_load_time = total_load_time;
        self
    }

    pub(crate) fn set_eviction_counts(
        &mut self,
        eviction_count: u64,
        expiration_count: u64,
    ) -> &mut Self {
        self.eviction_count = eviction_count;
        self.expiration_count = expiration_count;
        self
    }

    pub fn request_count(&self) -> u64 {
        self.hit_count.saturating_add(self.miss_count)
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn hit_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            1.0
        } else {
            self.hit_count as f64 / req_count as f64
        }
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    pub fn miss_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            0.0
        } else {
            self.miss_count as f64 / req_count as f64
        }
    }

    /// Number of values stored by put style operations.
    pub fn put_count(&self) -> u64 {
        self.put_count
    }

    pub fn load_count(&self) -> u64 {
        self.load_success_count
            .saturating_add(self.load_failure_count)
    }

    pub fn load_success_count(&self) -> u64 {
        self.load_success_count
    }

    pub fn load_failure_count(&self) -> u64 {
        self.load_failure_count
    }

    pub fn load_failure_rate(&self) -> f64 {
        let load_count = self.load_count();
        if load_count == 0 {
            0.0
        } else {
            self.load_failure_count as f64 / load_count as f64
        }
    }

    /// Number of loads that refreshed an entry in refresh probation. These
    /// are included in the load counts but were not counted as misses.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Total time spent in the loader, in nanoseconds.
    pub fn total_load_time(&self) -> u64 {
        self.total_load_time
    }

    pub fn average_load_penalty(&self) -> f64 {
        let load_count = self.load_count();
        if load_count == 0 {
            0.0
        } else {
            self.total_load_time as f64 / load_count as f64
        }
    }

    /// Number of entries evicted because of the capacity bound.
    pub fn eviction_count(&self) -> u64 {
        self.eviction_count
    }

    /// Number of entries removed because they expired.
    pub fn expiration_count(&self) -> u64 {
        self.expiration_count
    }
}

/// Counters of the eviction engine. Obtained by
/// [`Cache::eviction_metrics`][metrics].
///
/// The counters are monotonic until the cache is cleared.
///
/// [metrics]: ./struct.Cache.html#method.eviction_metrics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvictionMetrics {
    pub(crate) new_entry_count: u64,
    pub(crate) removed_count: u64,
    pub(crate) expired_removed_count: u64,
    pub(crate) virgin_removed_count: u64,
    pub(crate) evicted_count: u64,
    pub(crate) eviction_running_count: usize,
    pub(crate) max_size: u64,
    pub(crate) chunk_size: usize,
    pub(crate) size: usize,
}

impl EvictionMetrics {
    /// Number of entries admitted to the replacement list.
    pub fn new_entry_count(&self) -> u64 {
        self.new_entry_count
    }

    /// Number of entries removed by remove style operations.
    pub fn removed_count(&self) -> u64 {
        self.removed_count
    }

    /// Number of entries removed after expiring.
    pub fn expired_removed_count(&self) -> u64 {
        self.expired_removed_count
    }

    /// Number of entries removed before they were ever populated, for
    /// example because their load failed to start or a conditional operation
    /// did not store anything.
    pub fn virgin_removed_count(&self) -> u64 {
        self.virgin_removed_count
    }

    /// Number of entries evicted because of the capacity bound.
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    /// Number of entries collected by eviction passes that are in progress.
    pub fn eviction_running_count(&self) -> usize {
        self.eviction_running_count
    }

    /// The configured capacity. `u64::MAX` means unbounded.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of entries collected per eviction pass.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of entries in the replacement list.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::CacheStats;

    #[test]
    fn rates() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 1.0);
        assert_eq!(stats.miss_rate(), 0.0);
        assert_eq!(stats.average_load_penalty(), 0.0);

        stats
            .set_req_counts(3, 1)
            .set_load_counts(1, 1, 0, 100)
            .set_put_count(2);
        assert_eq!(stats.request_count(), 4);
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(stats.miss_rate(), 0.25);
        assert_eq!(stats.load_count(), 2);
        assert_eq!(stats.load_failure_rate(), 0.5);
        assert_eq!(stats.average_load_penalty(), 50.0);
        assert_eq!(stats.put_count(), 2);
    }
}
