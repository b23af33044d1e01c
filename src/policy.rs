use std::{fmt, time::Duration};

use crate::eviction::strategy::{ClockStrategy, FifoStrategy, ReplacementStrategy};

#[derive(Clone, Debug)]
/// The policy of a cache.
pub struct Policy {
    max_capacity: Option<u64>,
    initial_capacity: Option<usize>,
    parallelism: usize,
    num_segments: usize,
    hash_load_percent: u32,
    replacement_strategy: &'static str,
    expire_after_write: Option<Duration>,
    has_loader: bool,
}

impl Policy {
    // https://rust-lang.github.io/rust-clippy/master/index.html#too_many_arguments
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        max_capacity: Option<u64>,
        initial_capacity: Option<usize>,
        parallelism: usize,
        num_segments: usize,
        hash_load_percent: u32,
        replacement_strategy: &'static str,
        expire_after_write: Option<Duration>,
        has_loader: bool,
    ) -> Self {
        Self {
            max_capacity,
            initial_capacity,
            parallelism,
            num_segments,
            hash_load_percent,
            replacement_strategy,
            expire_after_write,
            has_loader,
        }
    }

    /// Returns the `max_capacity` of the cache. `None` means unbounded.
    pub fn max_capacity(&self) -> Option<u64> {
        self.max_capacity
    }

    /// Returns the `initial_capacity` hint the cache was built with.
    pub fn initial_capacity(&self) -> Option<usize> {
        self.initial_capacity
    }

    /// Returns the parallelism the segment count and the eviction chunk size
    /// were derived from.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Returns the number of lock segments of the hash table.
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    /// Returns the target fill of the hash table, in percent.
    pub fn hash_load_percent(&self) -> u32 {
        self.hash_load_percent
    }

    /// Returns the name of the replacement strategy, such as `"CLOCK"`.
    pub fn replacement_strategy(&self) -> &'static str {
        self.replacement_strategy
    }

    /// Returns the `expire_after_write` of the cache.
    pub fn expire_after_write(&self) -> Option<Duration> {
        self.expire_after_write
    }

    /// Returns `true` if the cache was built with a loader.
    pub fn has_loader(&self) -> bool {
        self.has_loader
    }
}

/// The eviction policy of a cache.
///
/// When the cache is full, the replacement strategy of the policy names the
/// entries to evict. The following policies are available:
///
/// - **CLOCK** (default):
///   - Entries that were hit since the strategy last looked at them get a
///     second chance and are moved to the back of the queue.
/// - **FIFO**:
///   - Entries are evicted in insertion order, whether or not they are used.
///
/// Use [`EvictionPolicy::clock`](#method.clock) or
/// [`EvictionPolicy::fifo`](#method.fifo) to obtain an instance. A strategy of
/// your own can be set with
/// [`CacheBuilder::replacement_strategy`][custom].
///
/// [custom]: ./struct.CacheBuilder.html#method.replacement_strategy
#[derive(Clone, Default)]
pub struct EvictionPolicy {
    pub(crate) config: EvictionPolicyConfig,
}

impl EvictionPolicy {
    /// Returns the CLOCK policy, which is suitable for most workloads.
    pub fn clock() -> Self {
        Self {
            config: EvictionPolicyConfig::Clock,
        }
    }

    /// Returns the FIFO policy.
    pub fn fifo() -> Self {
        Self {
            config: EvictionPolicyConfig::Fifo,
        }
    }

    pub(crate) fn strategy<K, V>(&self) -> Box<dyn ReplacementStrategy<K, V>>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        match self.config {
            EvictionPolicyConfig::Clock => Box::new(ClockStrategy::default()),
            EvictionPolicyConfig::Fifo => Box::new(FifoStrategy::default()),
        }
    }
}

impl fmt::Debug for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.config {
            EvictionPolicyConfig::Clock => write!(f, "EvictionPolicy::Clock"),
            EvictionPolicyConfig::Fifo => write!(f, "EvictionPolicy::Fifo"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum EvictionPolicyConfig {
    #[default]
    Clock,
    Fifo,
}

#[cfg(test)]
mod tests {
    use super::EvictionPolicy;

    #[test]
    fn strategies_by_policy() {
        assert_eq!(
            EvictionPolicy::default().strategy::<u32, u32>().name(),
            "CLOCK"
        );
        assert_eq!(EvictionPolicy::fifo().strategy::<u32, u32>().name(), "FIFO");
        assert_eq!(
            format!("{:?}", EvictionPolicy::fifo()),
            "EvictionPolicy::Fifo"
        );
    }
}
