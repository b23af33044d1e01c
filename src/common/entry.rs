use std::{fmt::Debug, sync::Arc, time::Duration};

/// A snapshot of a single entry in the cache.
///
/// `CacheEntry` is returned by [`Cache::get_entry`][get-entry] and
/// [`Cache::peek_entry`][peek-entry]. It holds the cached key and a clone of
/// the value at the time it was constructed. It also carries extra information
/// about the entry; [`is_fresh`](#method.is_fresh) returns `true` if the value
/// was loaded by the call that produced this snapshot.
///
/// [get-entry]: ./struct.Cache.html#method.get_entry
/// [peek-entry]: ./struct.Cache.html#method.peek_entry
pub struct CacheEntry<K, V> {
    key: Arc<K>,
    value: V,
    expires_in: Option<Duration>,
    is_fresh: bool,
}

impl<K, V> Debug for CacheEntry<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", self.key())
            .field("value", &self.value)
            .field("expires_in", &self.expires_in)
            .field("is_fresh", &self.is_fresh)
            .finish()
    }
}

impl<K, V> CacheEntry<K, V> {
    pub(crate) fn new(key: Arc<K>, value: V, expires_in: Option<Duration>, is_fresh: bool) -> Self {
        Self {
            key,
            value,
            expires_in,
            is_fresh,
        }
    }

    /// Returns a reference to the wrapped key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns a reference to the wrapped value.
    ///
    /// Note that the returned reference is _not_ pointing to the original value in
    /// the cache. It points to the clone held by this `CacheEntry`.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes this `CacheEntry`, returning the wrapped value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns the remaining lifetime of the entry at the time the snapshot
    /// was taken, or `None` if the entry never expires.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    /// Returns `true` if the value in this `CacheEntry` was not cached and was
    /// freshly loaded.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh
    }
}
