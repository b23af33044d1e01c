use crate::{
    common::{
        self,
        entry::CacheEntry,
        error::{CacheError, IntegrityError},
        time::Clock,
    },
    eviction::{strategy::ReplacementStrategy, Eviction},
    expiry::ExpiryTime,
    loader::Loader,
    notification::{notifier::RemovalNotifier, RemovalListener},
    operation::{
        operations::{
            ComputeIfAbsent, Contains, ContainsAndRemove, Expire, Get, GetEntry, Peek, PeekAndPut,
            PeekAndRemove, PeekAndReplace, PeekEntry, Put, PutIfAbsent, Refresh, Remove,
            RemoveIfEquals, Replace, ReplaceIfEquals,
        },
        processor::{Invoke, MutableEntry, ProcessorError},
        semantic::Semantic,
        KeyMaker, OperationEngine,
    },
    policy::Policy,
    stats::{
        stats_counter::{DefaultStatsCounter, DisabledStatsCounter, StatsCounter},
        CacheStats, EvictionMetrics,
    },
    table::{CollisionInfo, ConcurrentTable},
    CacheBuilder,
};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    sync::Arc,
    time::Duration,
};

/// A thread-safe, bounded cache with pluggable eviction.
///
/// Every method runs one operation against the entry of its key. Operations on
/// the same key that change the entry are serialized; reads never wait for
/// them and see the last committed state.
///
/// `Cache` is a cheaply clonable handle. Clones share the same storage, so
/// wrap nothing in an `Arc` before handing it to other threads.
///
/// # Examples
///
/// ```rust
/// use cachet::Cache;
///
/// use std::thread;
///
/// const NUM_THREADS: usize = 16;
/// const NUM_KEYS_PER_THREAD: usize = 64;
///
/// fn value(n: usize) -> String {
///     format!("value {n}")
/// }
///
/// // Create a cache that can store up to 10,000 entries.
/// let cache = Cache::new(10_000);
///
/// let threads: Vec<_> = (0..NUM_THREADS)
///     .map(|i| {
///         // To share the same cache across the threads, clone it.
///         let my_cache = cache.clone();
///         let start = i * NUM_KEYS_PER_THREAD;
///         let end = (i + 1) * NUM_KEYS_PER_THREAD;
///
///         thread::spawn(move || {
///             for key in start..end {
///                 my_cache.put(key, value(key)).unwrap();
///                 assert_eq!(my_cache.peek(&key).unwrap(), Some(value(key)));
///             }
///
///             // Remove every fourth element of the inserted elements.
///             for key in (start..end).step_by(4) {
///                 assert!(my_cache.contains_and_remove(&key).unwrap());
///             }
///         })
///     })
///     .collect();
///
/// threads.into_iter().for_each(|t| t.join().expect("Failed"));
///
/// for key in 0..(NUM_THREADS * NUM_KEYS_PER_THREAD) {
///     if key % 4 == 0 {
///         assert_eq!(cache.peek(&key).unwrap(), None);
///     } else {
///         assert_eq!(cache.peek(&key).unwrap(), Some(value(key)));
///     }
/// }
/// ```
///
/// # Errors
///
/// Every operation fails with [`CacheError::Closed`][closed] once the cache is
/// closed. Operations that load return the failure of the loader, and the
/// failure stays in the entry until it is overwritten or expires.
///
/// [closed]: ./enum.CacheError.html#variant.Closed
pub struct Cache<K, V, S = RandomState> {
    inner: Arc<Inner<K, V>>,
    build_hasher: S,
}

struct Inner<K, V> {
    name: Option<String>,
    policy: Policy,
    engine: OperationEngine<K, V>,
}

impl<K, V, S> Clone for Cache<K, V, S>
where
    S: Clone,
{
    /// Makes a clone of this shared cache.
    ///
    /// This operation is cheap as it only creates thread-safe reference
    /// counted pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            build_hasher: self.build_hasher.clone(),
        }
    }
}

impl<K, V, S> fmt::Debug for Cache<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("entry_count", &self.entry_count())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl<K, V> Cache<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new `Cache<K, V>` that will store up to the
    /// `max_capacity` entries.
    ///
    /// To adjust various configuration knobs such as the eviction policy or
    /// the loader, use the [`CacheBuilder`][builder-struct].
    ///
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn new(max_capacity: u64) -> Self {
        CacheBuilder::new(max_capacity).build()
    }

    /// Returns a [`CacheBuilder`][builder-struct], which can build a `Cache`
    /// with various configuration knobs.
    ///
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn builder() -> CacheBuilder<K, V, Cache<K, V, RandomState>> {
        CacheBuilder::default()
    }
}

impl<K, V, S> Cache<K, V, S> {
    /// Returns cache’s name.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns a read-only cache policy of this cache.
    pub fn policy(&self) -> Policy {
        self.inner.policy.clone()
    }

    /// Returns the number of entries in the table, including entries that are
    /// still being populated and entries whose expiry time passed but that no
    /// operation has removed yet.
    pub fn entry_count(&self) -> u64 {
        self.inner.engine.entry_count()
    }

    /// Returns a snapshot of the statistics. All counters stay zero unless the
    /// cache was built with [`record_stats`][record-stats].
    ///
    /// [record-stats]: ./struct.CacheBuilder.html#method.record_stats
    pub fn stats(&self) -> CacheStats {
        self.inner.engine.stats().snapshot()
    }

    /// Returns the counters of the eviction engine.
    pub fn eviction_metrics(&self) -> EvictionMetrics {
        self.inner.engine.eviction_metrics()
    }

    /// Walks the whole hash table and reports how its entries collide. Meant
    /// for diagnostics; every other operation waits while the table is walked.
    pub fn collision_info(&self) -> Result<CollisionInfo, CacheError> {
        self.inner.engine.collision_info()
    }

    /// Returns `true` once [`close`](#method.close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.engine.is_closed()
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    // https://rust-lang.github.io/rust-clippy/master/index.html#too_many_arguments
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_everything(
        name: Option<String>,
        max_capacity: Option<u64>,
        initial_capacity: Option<usize>,
        parallelism: Option<usize>,
        hash_load_percent: u32,
        strategy: Box<dyn ReplacementStrategy<K, V>>,
        loader: Option<Arc<dyn Loader<K, V>>>,
        expire_after_write: Option<Duration>,
        removal_listener: Option<RemovalListener<K, V>>,
        record_stats: bool,
        clock: Clock,
        build_hasher: S,
    ) -> Self {
        let parallelism = parallelism.unwrap_or_else(common::available_parallelism);
        let strategy_name = strategy.name();

        let table = Arc::new(ConcurrentTable::new(
            parallelism,
            initial_capacity,
            hash_load_percent,
            name.clone(),
        ));
        let stats: Arc<dyn StatsCounter> = if record_stats {
            Arc::new(DefaultStatsCounter::default())
        } else {
            Arc::new(DisabledStatsCounter)
        };
        let notifier = removal_listener.map(|l| Arc::new(RemovalNotifier::new(l, name.clone())));
        let eviction = Eviction::new(
            max_capacity,
            parallelism,
            strategy,
            Arc::clone(&table),
            notifier.clone(),
            Arc::clone(&stats),
            name.clone(),
        );

        let policy = Policy::new(
            max_capacity,
            initial_capacity,
            parallelism,
            table.segment_count(),
            hash_load_percent,
            strategy_name,
            expire_after_write,
            loader.is_some(),
        );
        let engine = OperationEngine::new(
            table,
            eviction,
            loader,
            expire_after_write,
            clock,
            stats,
            notifier,
            name.clone(),
        );

        Self {
            inner: Arc::new(Inner {
                name,
                policy,
                engine,
            }),
            build_hasher,
        }
    }

    /// Returns the value of the key, or `None` if the cache holds no value for
    /// it. Never calls the loader.
    pub fn peek<Q>(&self, key: &Q) -> Result<Option<V>, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut Peek)
    }

    /// Returns the value of the key, loading it when the cache holds none.
    ///
    /// A value whose expiry passed is loaded again; a value in refresh
    /// probation (see [`ExpiryTime::Refresh`][refresh]) is reloaded and the load
    /// is counted as a refresh. Without a loader this is the same as `peek`.
    ///
    /// Concurrent calls for the same key call the loader once; the other
    /// callers wait and get the loaded value.
    ///
    /// [refresh]: ./enum.ExpiryTime.html#variant.Refresh
    pub fn get<Q>(&self, key: &Q) -> Result<Option<V>, CacheError>
    where
        K: Borrow<Q>,
        Q: ToOwned<Owned = K> + Hash + Eq + ?Sized,
    {
        if !self.inner.engine.has_loader() {
            return self.peek(key);
        }
        let make_key = || Arc::new(key.to_owned());
        let make_key: KeyMaker<'_, K> = &make_key;
        self.execute_with(key, Some(make_key), &mut Get)
    }

    /// Same as [`get`](#method.get), returning a snapshot of the entry.
    /// [`CacheEntry::is_fresh`][fresh] tells whether the value was loaded by
    /// this call.
    ///
    /// [fresh]: ./struct.CacheEntry.html#method.is_fresh
    pub fn get_entry<Q>(&self, key: &Q) -> Result<Option<CacheEntry<K, V>>, CacheError>
    where
        K: Borrow<Q>,
        Q: ToOwned<Owned = K> + Hash + Eq + ?Sized,
    {
        if !self.inner.engine.has_loader() {
            return self.peek_entry(key);
        }
        let make_key = || Arc::new(key.to_owned());
        let make_key: KeyMaker<'_, K> = &make_key;
        self.execute_with(key, Some(make_key), &mut GetEntry)
    }

    /// Same as [`peek`](#method.peek), returning a snapshot of the entry.
    pub fn peek_entry<Q>(&self, key: &Q) -> Result<Option<CacheEntry<K, V>>, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut PeekEntry)
    }

    /// Stores the value for the key, replacing any previous one.
    pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        self.execute(key, &mut Put::new(value))
    }

    /// Removes the entry of the key, if any.
    pub fn remove<Q>(&self, key: &Q) -> Result<(), CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut Remove)
    }

    /// Returns `true` if the cache holds a value for the key. Never calls the
    /// loader and does not count as a hit or a miss.
    pub fn contains_key<Q>(&self, key: &Q) -> Result<bool, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut Contains)
    }

    /// Removes the entry of the key. Returns whether it held a value.
    pub fn contains_and_remove<Q>(&self, key: &Q) -> Result<bool, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut ContainsAndRemove)
    }

    /// Removes the entry of the key. Returns the value it held.
    pub fn peek_and_remove<Q>(&self, key: &Q) -> Result<Option<V>, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut PeekAndRemove)
    }

    /// Replaces the value of the key if the cache holds one. Returns the
    /// previous value.
    pub fn peek_and_replace<Q>(&self, key: &Q, value: V) -> Result<Option<V>, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut PeekAndReplace::new(value))
    }

    /// Stores the value for the key. Returns the previous value.
    pub fn peek_and_put(&self, key: K, value: V) -> Result<Option<V>, CacheError> {
        self.execute(key, &mut PeekAndPut::new(value))
    }

    /// Returns the value of the key. When the cache holds none, calls `init`
    /// and stores its result.
    ///
    /// Concurrent calls for the same key call `init` once; the other callers
    /// get the stored value. A panic in `init` is returned as
    /// [`CacheError::Processing`][processing] and leaves no entry behind.
    ///
    /// [processing]: ./enum.CacheError.html#variant.Processing
    pub fn compute_if_absent(&self, key: K, init: impl FnOnce() -> V) -> Result<V, CacheError> {
        self.execute(key, &mut ComputeIfAbsent::new(init))
    }

    /// Stores the value unless the cache holds one for the key. Returns whether
    /// it was stored.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<bool, CacheError> {
        self.execute(key, &mut PutIfAbsent::new(value))
    }

    /// Replaces the value of the key if the cache holds one. Returns whether
    /// it was replaced.
    pub fn replace<Q>(&self, key: &Q, value: V) -> Result<bool, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut Replace::new(value))
    }

    /// Replaces the value of the key only if it equals `expected`. Returns
    /// whether it was replaced.
    ///
    /// The comparison is made while no other operation can change the entry,
    /// so a value written concurrently makes this call fail.
    pub fn replace_if_equals<Q>(&self, key: &Q, expected: V, value: V) -> Result<bool, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        self.execute_borrowed(key, &mut ReplaceIfEquals::new(expected, value))
    }

    /// Removes the entry of the key only if its value equals `expected`.
    /// Returns whether it was removed.
    pub fn remove_if_equals<Q>(&self, key: &Q, expected: &V) -> Result<bool, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        self.execute_borrowed(key, &mut RemoveIfEquals::new(expected))
    }

    /// Runs `processor` on the entry of the key while no other operation can
    /// change it, and returns its result.
    ///
    /// The processor sees the entry through a [`MutableEntry`][mutable]; the
    /// changes it makes are applied once it returns `Ok`. With `read_through`,
    /// [`MutableEntry::value`][value] loads a missing value first. The
    /// processor is then run again from the start, so it must not have side
    /// effects outside the entry.
    ///
    /// Errors returned by the processor, and panics, are reported as
    /// [`CacheError::Processing`][processing].
    ///
    /// [mutable]: ./struct.MutableEntry.html
    /// [value]: ./struct.MutableEntry.html#method.value
    /// [processing]: ./enum.CacheError.html#variant.Processing
    pub fn invoke<R, F>(&self, key: K, read_through: bool, processor: F) -> Result<R, CacheError>
    where
        F: FnMut(&mut MutableEntry<'_, K, V>) -> Result<R, ProcessorError>,
    {
        self.execute(key, &mut Invoke::new(processor, read_through))
    }

    /// Changes the expiry of the entry of the key. See
    /// [`ExpiryTime`][expiry-time] for which entries each value applies to.
    ///
    /// [expiry-time]: ./enum.ExpiryTime.html
    pub fn expire_at<Q>(&self, key: &Q, expiry: ExpiryTime) -> Result<(), CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.execute_borrowed(key, &mut Expire::new(expiry))
    }

    /// Loads the value of the key, whether or not the cache holds one.
    pub fn refresh(&self, key: K) -> Result<(), CacheError> {
        self.execute(key, &mut Refresh)
    }

    /// Runs a semantic of your own against the entry of the key. The entry is
    /// created when the semantic asks for a mutation and none exists.
    pub fn execute<X>(&self, key: K, semantic: &mut X) -> Result<X::Output, CacheError>
    where
        X: Semantic<K, V>,
    {
        let key = Arc::new(key);
        let make_key = || Arc::clone(&key);
        let make_key: KeyMaker<'_, K> = &make_key;
        self.execute_with(&*key, Some(make_key), semantic)
    }

    /// Removes every entry. Entries that held a value are notified as
    /// explicitly removed. The eviction counters start over.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.inner.engine.clear()
    }

    /// Drops every entry, without notifying the removal listener. Every
    /// operation issued afterwards fails with `CacheError::Closed`.
    pub fn close(&self) {
        self.inner.engine.close();
    }

    /// Checks that the table and the replacement strategy agree on the
    /// entries they hold, and that no key is held twice.
    ///
    /// The check takes every lock of the cache. The counts only settle while
    /// no operation is running, so call it when the cache is quiescent.
    pub fn check_integrity(&self) -> Result<(), IntegrityError> {
        self.inner.engine.check_integrity()
    }

    fn execute_borrowed<Q, X>(&self, key: &Q, semantic: &mut X) -> Result<X::Output, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        X: Semantic<K, V>,
    {
        self.execute_with(key, None, semantic)
    }

    fn execute_with<Q, X>(
        &self,
        key: &Q,
        make_key: Option<KeyMaker<'_, K>>,
        semantic: &mut X,
    ) -> Result<X::Output, CacheError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        X: Semantic<K, V>,
    {
        let hash = self.hash(key);
        self.inner.engine.execute(key, hash, make_key, semantic)
    }

    #[inline]
    pub(crate) fn hash<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut hasher = self.build_hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

// To see the debug prints, run test as `cargo test -- --nocapture`
#[cfg(test)]
mod tests {
    use super::Cache;
    use crate::{
        common::time::Clock, CacheBuilder, CacheError, EvictionPolicy, ExpiryTime,
        ProcessorError, RemovalCause,
    };

    use parking_lot::Mutex;
    use std::{
        convert::Infallible,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[derive(thiserror::Error, Debug)]
    #[error("key {0} is not loadable")]
    struct NotLoadable(u32);

    type Removals = Arc<Mutex<Vec<(u32, String, RemovalCause)>>>;

    fn listener(removals: &Removals) -> impl Fn(Arc<u32>, String, RemovalCause) + Send + Sync {
        let removals = Arc::clone(removals);
        move |k, v, cause| removals.lock().push((*k, v, cause))
    }

    #[test]
    fn basic_single_thread() {
        let removals = Removals::default();
        let cache = Cache::builder()
            .max_capacity(3)
            .eviction_policy(EvictionPolicy::fifo())
            .removal_listener(listener(&removals))
            .record_stats()
            .build();

        cache.put(1, "alice".to_string()).unwrap();
        cache.put(2, "bob".to_string()).unwrap();
        assert_eq!(cache.peek(&1).unwrap(), Some("alice".into()));
        assert!(cache.contains_key(&2).unwrap());
        assert_eq!(cache.peek(&3).unwrap(), None);

        cache.put(3, "cindy".to_string()).unwrap();
        cache.put(4, "david".to_string()).unwrap();
        // Alice was the first in.
        assert_eq!(cache.peek(&1).unwrap(), None);
        assert_eq!(cache.entry_count(), 3);

        cache.remove(&2).unwrap();
        assert_eq!(cache.peek(&2).unwrap(), None);
        cache.check_integrity().unwrap();

        assert_eq!(
            *removals.lock(),
            vec![
                (1, "alice".into(), RemovalCause::Size),
                (2, "bob".into(), RemovalCause::Explicit)
            ]
        );

        let stats = cache.stats();
        assert_eq!(stats.hit_count(), 1);
        assert_eq!(stats.miss_count(), 3);
        assert_eq!(stats.put_count(), 4);
        assert_eq!(stats.eviction_count(), 1);
        assert_eq!(cache.eviction_metrics().evicted_count(), 1);
    }

    #[test]
    fn combined_operations() {
        let cache: Cache<u32, String> = Cache::new(100);

        assert_eq!(cache.peek_and_put(1, "a".into()).unwrap(), None);
        assert_eq!(cache.peek_and_put(1, "b".into()).unwrap(), Some("a".into()));
        assert_eq!(cache.peek_and_replace(&1, "c".into()).unwrap(), Some("b".into()));
        assert_eq!(cache.peek_and_replace(&2, "x".into()).unwrap(), None);
        assert!(!cache.contains_key(&2).unwrap());

        assert!(!cache.put_if_absent(1, "d".into()).unwrap());
        assert!(cache.put_if_absent(2, "e".into()).unwrap());
        assert!(cache.replace(&2, "f".into()).unwrap());
        assert!(!cache.replace(&3, "g".into()).unwrap());
        assert!(!cache.contains_key(&3).unwrap());

        assert!(!cache.replace_if_equals(&2, "zzz".into(), "h".into()).unwrap());
        assert!(cache.replace_if_equals(&2, "f".into(), "h".into()).unwrap());
        assert!(!cache.remove_if_equals(&2, &"f".to_string()).unwrap());
        assert!(cache.remove_if_equals(&2, &"h".to_string()).unwrap());

        assert_eq!(cache.peek_and_remove(&1).unwrap(), Some("c".into()));
        assert_eq!(cache.peek_and_remove(&1).unwrap(), None);
        assert!(!cache.contains_and_remove(&1).unwrap());
        assert_eq!(cache.entry_count(), 0);
        cache.check_integrity().unwrap();
    }

    #[test]
    fn conditional_updates_count_hits_and_misses() {
        let cache: Cache<u32, String> = CacheBuilder::new(100).record_stats().build();
        cache.put(1, "a".into()).unwrap();

        assert!(cache.replace(&1, "b".into()).unwrap());
        assert!(!cache.replace(&2, "x".into()).unwrap());
        assert!(cache.replace_if_equals(&1, "b".into(), "c".into()).unwrap());
        // A value that does not match is still a hit.
        assert!(!cache.replace_if_equals(&1, "zzz".into(), "d".into()).unwrap());
        assert!(!cache.remove_if_equals(&3, &"c".to_string()).unwrap());

        let stats = cache.stats();
        assert_eq!(stats.hit_count(), 3);
        assert_eq!(stats.miss_count(), 2);
        assert_eq!(stats.put_count(), 3);
    }

    #[test]
    fn compute_if_absent_runs_once() {
        let cache: Cache<u32, String> = Cache::new(100);
        let calls = AtomicUsize::new(0);
        let init = || {
            calls.fetch_add(1, Ordering::Relaxed);
            "computed".to_string()
        };

        assert_eq!(cache.compute_if_absent(1, init).unwrap(), "computed");
        assert_eq!(cache.compute_if_absent(1, init).unwrap(), "computed");
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let err = cache
            .compute_if_absent(2, || panic!("init failed"))
            .unwrap_err();
        assert!(
            matches!(err, CacheError::Processing(ref e) if e.to_string().contains("init failed"))
        );
        assert!(!cache.contains_key(&2).unwrap());
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn loader_results_and_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls1 = Arc::clone(&calls);
        let cache = Cache::builder()
            .loader(move |k: &u32| {
                calls1.fetch_add(1, Ordering::Relaxed);
                if *k < 10 {
                    Ok(format!("v{k}"))
                } else {
                    Err(NotLoadable(*k))
                }
            })
            .record_stats()
            .build();

        assert_eq!(cache.peek(&1).unwrap(), None);
        assert_eq!(cache.get(&1).unwrap(), Some("v1".into()));
        let entry = cache.get_entry(&2).unwrap().unwrap();
        assert!(entry.is_fresh());
        assert_eq!(entry.value(), "v2");
        let entry = cache.get_entry(&2).unwrap().unwrap();
        assert!(!entry.is_fresh());
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        let err = cache.get(&10).unwrap_err();
        assert_eq!(err.to_string(), "the loader failed: key 10 is not loadable");
        // Readers share the stored failure.
        let again = cache.get(&10).unwrap_err();
        assert!(Arc::ptr_eq(err.inner().unwrap(), again.inner().unwrap()));
        assert_eq!(calls.load(Ordering::Relaxed), 3);

        // A put overwrites the failure.
        cache.put(10, "ten".into()).unwrap();
        assert_eq!(cache.get(&10).unwrap(), Some("ten".into()));

        cache.refresh(1).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 4);

        let stats = cache.stats();
        assert_eq!(stats.load_success_count(), 3);
        assert_eq!(stats.load_failure_count(), 1);
        assert_eq!(stats.refresh_count(), 1);
    }

    #[test]
    fn refresh_without_loader() {
        let cache: Cache<u32, u32> = Cache::new(10);
        assert!(matches!(
            cache.refresh(1),
            Err(CacheError::LoaderNotConfigured)
        ));
        // Without a loader, `get` is a `peek`.
        assert_eq!(cache.get(&1).unwrap(), None);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn expiry() {
        let (clock, mock) = Clock::mock();
        let removals = Removals::default();
        let cache = CacheBuilder::new(100)
            .expire_after_write(Duration::from_secs(10))
            .removal_listener(listener(&removals))
            .clock(clock)
            .build();

        cache.put(1, "a".to_string()).unwrap();
        cache.put(2, "b".to_string()).unwrap();
        cache.put(3, "c".to_string()).unwrap();
        cache.expire_at(&2, ExpiryTime::Eternal).unwrap();
        cache.expire_at(&3, ExpiryTime::NoCache).unwrap();
        assert_eq!(cache.peek(&3).unwrap(), None);
        assert_eq!(cache.entry_count(), 2);

        let entry = cache.peek_entry(&1).unwrap().unwrap();
        assert_eq!(entry.expires_in(), Some(Duration::from_secs(10)));

        mock.increment(Duration::from_secs(10));
        assert_eq!(cache.peek(&1).unwrap(), None);
        assert_eq!(cache.peek(&2).unwrap(), Some("b".into()));
        assert_eq!(cache.peek_entry(&2).unwrap().unwrap().expires_in(), None);

        // Expiring an expired entry does nothing; overwriting it reports the
        // expiry.
        cache.expire_at(&1, ExpiryTime::After(Duration::from_secs(60))).unwrap();
        assert_eq!(cache.peek(&1).unwrap(), None);
        cache.put(1, "a2".to_string()).unwrap();
        assert_eq!(cache.peek(&1).unwrap(), Some("a2".into()));

        assert_eq!(
            *removals.lock(),
            vec![
                (3, "c".into(), RemovalCause::Expired),
                (1, "a".into(), RemovalCause::Expired)
            ]
        );
        assert_eq!(cache.eviction_metrics().expired_removed_count(), 1);
    }

    #[test]
    fn refresh_probation() {
        let loads = Arc::new(AtomicUsize::new(0));
        let loads1 = Arc::clone(&loads);
        let cache = Cache::builder()
            .loader(move |k: &u32| {
                let n = loads1.fetch_add(1, Ordering::Relaxed);
                Ok::<_, Infallible>(k * 100 + n as u32)
            })
            .record_stats()
            .build();

        assert_eq!(cache.get(&1).unwrap(), Some(100));
        cache.expire_at(&1, ExpiryTime::Refresh).unwrap();
        // The old value is kept but no longer served.
        assert_eq!(cache.peek(&1).unwrap(), None);
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.get(&1).unwrap(), Some(101));

        let stats = cache.stats();
        assert_eq!(stats.refresh_count(), 1);
        // An entry in probation is neither a hit nor a miss.
        assert_eq!(stats.miss_count(), 1);
        assert_eq!(stats.hit_count(), 0);
    }

    #[test]
    fn invoke_processors() {
        let cache = Cache::builder()
            .loader(|k: &u32| Ok::<_, Infallible>(k * 2))
            .build();

        let doubled = cache
            .invoke(5, true, |e| {
                let v = e.value()?.unwrap_or_default();
                e.set_value(v + 1);
                Ok(v)
            })
            .unwrap();
        assert_eq!(doubled, 10);
        assert_eq!(cache.peek(&5).unwrap(), Some(11));

        let existed = cache
            .invoke(6, false, |e| {
                let existed = e.exists();
                e.set_value(1);
                Ok(existed)
            })
            .unwrap();
        assert!(!existed);
        assert_eq!(cache.peek(&6).unwrap(), Some(1));

        #[derive(thiserror::Error, Debug)]
        #[error("refused")]
        struct Refused;

        let err = cache
            .invoke(6, false, |e| -> Result<(), ProcessorError> {
                e.remove();
                Err(Refused.into())
            })
            .unwrap_err();
        assert!(matches!(err, CacheError::Processing(ref e) if e.to_string() == "refused"));
        // The failed processor left the entry alone.
        assert_eq!(cache.peek(&6).unwrap(), Some(1));

        let err = cache
            .invoke(7, false, |_| -> Result<(), ProcessorError> { panic!("oops") })
            .unwrap_err();
        assert!(matches!(err, CacheError::Processing(_)));
        assert!(!cache.contains_key(&7).unwrap());
        cache.check_integrity().unwrap();
    }

    #[test]
    fn clear_and_close() {
        let removals = Removals::default();
        let cache = CacheBuilder::new(100)
            .name("closing")
            .removal_listener(listener(&removals))
            .build();

        for k in 0..10 {
            cache.put(k, k.to_string()).unwrap();
        }
        cache.clear().unwrap();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(removals.lock().len(), 10);
        assert_eq!(cache.eviction_metrics().new_entry_count(), 0);

        cache.put(1, "one".into()).unwrap();
        cache.close();
        assert!(cache.is_closed());
        assert!(matches!(cache.peek(&1), Err(CacheError::Closed)));
        assert!(matches!(cache.put(2, "two".into()), Err(CacheError::Closed)));
        assert!(matches!(cache.clear(), Err(CacheError::Closed)));
        assert!(cache.check_integrity().is_err());
        assert_eq!(removals.lock().len(), 10);
    }

    #[test]
    fn debug_and_collisions() {
        let cache: Cache<u32, u32> = CacheBuilder::new(100).name("dbg").build();
        for k in 0..20 {
            cache.put(k, k).unwrap();
        }
        let info = cache.collision_info().unwrap();
        assert!(info.longest_collision_size >= 1);
        let debug = format!("{cache:?}");
        assert!(debug.contains("dbg"));
        assert!(debug.contains("entry_count: 20"));
    }
}
