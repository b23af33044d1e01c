use crate::{
    common::{concurrent::constants::DEFAULT_HASH_LOAD_PERCENT, time::Clock},
    eviction::strategy::ReplacementStrategy,
    loader::{FnLoader, Loader},
    notification::{RemovalCause, RemovalListener},
    policy::EvictionPolicy,
    Cache,
};

use std::{
    collections::hash_map::RandomState,
    error::Error,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
    sync::Arc,
    time::Duration,
};

/// Builds a [`Cache`][cache-struct] with various configuration knobs.
///
/// [cache-struct]: ./struct.Cache.html
///
/// # Examples
///
/// ```rust
/// use cachet::{CacheBuilder, EvictionPolicy};
///
/// use std::time::Duration;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("no such user: {0}")]
/// struct NoSuchUser(u32);
///
/// let cache = CacheBuilder::new(10_000) // Max 10,000 entries
///     .name("users")
///     .eviction_policy(EvictionPolicy::fifo())
///     // Values are reloaded 30 minutes after they were written.
///     .expire_after_write(Duration::from_secs(30 * 60))
///     .loader(|id: &u32| {
///         if *id < 100 {
///             Ok(format!("user-{id}"))
///         } else {
///             Err(NoSuchUser(*id))
///         }
///     })
///     .build();
///
/// assert_eq!(cache.get(&7).unwrap(), Some("user-7".to_string()));
/// assert!(cache.get(&700).is_err());
/// ```
///
pub struct CacheBuilder<K, V, C> {
    name: Option<String>,
    max_capacity: Option<u64>,
    initial_capacity: Option<usize>,
    parallelism: Option<usize>,
    hash_load_percent: u32,
    eviction_policy: EvictionPolicy,
    replacement_strategy: Option<Box<dyn ReplacementStrategy<K, V>>>,
    loader: Option<Arc<dyn Loader<K, V>>>,
    expire_after_write: Option<Duration>,
    removal_listener: Option<RemovalListener<K, V>>,
    record_stats: bool,
    clock: Clock,
    cache_type: PhantomData<C>,
}

impl<K, V> Default for CacheBuilder<K, V, Cache<K, V, RandomState>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            name: None,
            max_capacity: None,
            initial_capacity: None,
            parallelism: None,
            hash_load_percent: DEFAULT_HASH_LOAD_PERCENT,
            eviction_policy: EvictionPolicy::default(),
            replacement_strategy: None,
            loader: None,
            expire_after_write: None,
            removal_listener: None,
            record_stats: false,
            clock: Clock::default(),
            cache_type: PhantomData,
        }
    }
}

impl<K, V> CacheBuilder<K, V, Cache<K, V, RandomState>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Construct a new `CacheBuilder` that will be used to build a `Cache`
    /// holding up to `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            max_capacity: Some(max_capacity),
            ..Default::default()
        }
    }

    /// Builds a `Cache<K, V>`.
    pub fn build(self) -> Cache<K, V, RandomState> {
        let build_hasher = RandomState::default();
        self.build_with_hasher(build_hasher)
    }

    /// Builds a `Cache<K, V, S>` with the given `hasher` of type `S`.
    pub fn build_with_hasher<S>(self, hasher: S) -> Cache<K, V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        let strategy = self
            .replacement_strategy
            .unwrap_or_else(|| self.eviction_policy.strategy());
        Cache::with_everything(
            self.name,
            self.max_capacity,
            self.initial_capacity,
            self.parallelism,
            self.hash_load_percent,
            strategy,
            self.loader,
            self.expire_after_write,
            self.removal_listener,
            self.record_stats,
            self.clock,
            hasher,
        )
    }
}

impl<K, V, C> CacheBuilder<K, V, C> {
    /// Sets the name of the cache. Currently the name is used for
    /// identification only in logging messages.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the max capacity of the cache.
    pub fn max_capacity(self, max_capacity: u64) -> Self {
        Self {
            max_capacity: Some(max_capacity),
            ..self
        }
    }

    /// Sets the initial capacity (number of entries) of the cache. The hash
    /// table is sized so that it does not grow before holding this many
    /// entries.
    pub fn initial_capacity(self, number_of_entries: usize) -> Self {
        Self {
            initial_capacity: Some(number_of_entries),
            ..self
        }
    }

    /// Sets the expected number of threads using the cache at the same time.
    /// It sets the number of lock segments of the hash table and the number of
    /// entries evicted per pass.
    ///
    /// Defaults to the parallelism reported by the operating system.
    ///
    /// # Panics
    ///
    /// Panics if `parallelism` is zero.
    pub fn parallelism(self, parallelism: usize) -> Self {
        assert!(parallelism > 0, "parallelism must be greater than zero");
        Self {
            parallelism: Some(parallelism),
            ..self
        }
    }

    /// Sets how full, in percent, the hash table may get before it doubles.
    /// Defaults to 50.
    ///
    /// # Panics
    ///
    /// Panics if `percent` is not within `1..=100`.
    pub fn hash_load_percent(self, percent: u32) -> Self {
        assert!(
            (1..=100).contains(&percent),
            "hash_load_percent must be within 1..=100"
        );
        Self {
            hash_load_percent: percent,
            ..self
        }
    }

    /// Sets the eviction (replacement) policy of the cache.
    ///
    /// The default policy is CLOCK. See [`EvictionPolicy`][eviction-policy]
    /// for more details.
    ///
    /// [eviction-policy]: ./struct.EvictionPolicy.html
    pub fn eviction_policy(self, policy: EvictionPolicy) -> Self {
        Self {
            eviction_policy: policy,
            replacement_strategy: None,
            ..self
        }
    }

    /// Sets a replacement strategy of your own. It overrides the eviction
    /// policy.
    pub fn replacement_strategy(
        self,
        strategy: impl ReplacementStrategy<K, V> + 'static,
    ) -> Self {
        Self {
            replacement_strategy: Some(Box::new(strategy)),
            ..self
        }
    }

    /// Sets the loader the cache calls for `get`, `get_entry`, `refresh` and
    /// read-through entry processors.
    ///
    /// An error returned by the closure is stored in the entry and returned to
    /// every reader of the entry until it is overwritten or expires.
    pub fn loader<F, E>(self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
        E: Error + Send + Sync + 'static,
    {
        Self {
            loader: Some(Arc::new(FnLoader::<_, E>::new(loader))),
            ..self
        }
    }

    /// Same as [`loader`](#method.loader), taking an implementation of the
    /// [`Loader`][loader] trait.
    ///
    /// [loader]: ./trait.Loader.html
    pub fn with_loader(self, loader: impl Loader<K, V>) -> Self {
        Self {
            loader: Some(Arc::new(loader)),
            ..self
        }
    }

    /// Sets the lifetime of the values written by `put` and friends, and of
    /// the values and failures produced by the loader.
    ///
    /// Without it, values never expire unless `expire_at` is called.
    pub fn expire_after_write(self, duration: Duration) -> Self {
        Self {
            expire_after_write: Some(duration),
            ..self
        }
    }

    /// Sets the eviction listener closure to the cache.
    ///
    /// The closure is called after an entry that held a value was removed,
    /// replaced, expired or evicted, outside every lock of the cache.
    ///
    /// # Panics
    ///
    /// It is very important to make the listener closure not to panic.
    /// Otherwise, the cache will stop calling the listener after a panic. This
    /// is an intended behavior because the cache cannot know whether it is
    /// memory safe or not to call the panicked listener again.
    pub fn removal_listener(
        self,
        listener: impl Fn(Arc<K>, V, RemovalCause) + Send + Sync + 'static,
    ) -> Self {
        Self {
            removal_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Enables the recording of hit, miss, put and load statistics. See
    /// [`Cache::stats`](./struct.Cache.html#method.stats).
    pub fn record_stats(self) -> Self {
        Self {
            record_stats: true,
            ..self
        }
    }

    #[cfg(test)]
    pub(crate) fn clock(self, clock: Clock) -> Self {
        Self { clock, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::CacheBuilder;
    use crate::{strategy::FifoStrategy, Cache, EvictionPolicy};

    use std::time::Duration;

    #[test]
    fn build_cache() {
        // Cache<char, String>
        let cache = CacheBuilder::new(100).build();
        let policy = cache.policy();

        assert_eq!(policy.max_capacity(), Some(100));
        assert_eq!(policy.expire_after_write(), None);
        assert_eq!(policy.replacement_strategy(), "CLOCK");
        assert_eq!(policy.hash_load_percent(), 50);
        assert!(!policy.has_loader());

        cache.put('a', "Alice".to_string()).unwrap();
        assert_eq!(cache.get(&'a').unwrap(), Some("Alice".to_string()));

        let cache: Cache<u32, u32> = CacheBuilder::new(100)
            .name("tuned")
            .parallelism(3)
            .initial_capacity(1_000)
            .hash_load_percent(75)
            .eviction_policy(EvictionPolicy::fifo())
            .expire_after_write(Duration::from_secs(45 * 60))
            .build();
        let policy = cache.policy();

        assert_eq!(cache.name(), Some("tuned"));
        assert_eq!(policy.parallelism(), 3);
        assert_eq!(policy.num_segments(), 4);
        assert_eq!(policy.initial_capacity(), Some(1_000));
        assert_eq!(policy.hash_load_percent(), 75);
        assert_eq!(policy.replacement_strategy(), "FIFO");
        assert_eq!(
            policy.expire_after_write(),
            Some(Duration::from_secs(45 * 60))
        );
    }

    #[test]
    fn custom_strategy_overrides_policy() {
        let cache: Cache<u32, u32> = CacheBuilder::default()
            .replacement_strategy(FifoStrategy::default())
            .build();
        assert_eq!(cache.policy().replacement_strategy(), "FIFO");
        assert_eq!(cache.policy().max_capacity(), None);
    }

    #[test]
    #[should_panic(expected = "hash_load_percent must be within 1..=100")]
    fn zero_load_percent() {
        let _ = CacheBuilder::<u32, u32, _>::new(10).hash_load_percent(0);
    }

    #[test]
    #[should_panic(expected = "parallelism must be greater than zero")]
    fn zero_parallelism() {
        let _ = CacheBuilder::<u32, u32, _>::new(10).parallelism(0);
    }
}
