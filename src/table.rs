//! A segmented hash table of entries.
//!
//! The table keeps a single bucket array whose buckets are the heads of
//! collision chains linked through `Entry::another`. Lock state is split into
//! a small, fixed number of segments selected by the low bits of the hash.
//! Since the bucket array is never smaller than the segment count, every
//! bucket belongs to exactly one segment.
//!
//! Lookups walk a chain without locking and validate the segment stamp
//! afterwards. Inserts and removals take the write lock of their segment.
//! Growing the bucket array takes the write locks of all segments, in order.

use std::{
    borrow::Borrow,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwapOption;
use crossbeam_utils::CachePadded;
use smallvec::SmallVec;

use crate::{
    common::{
        self,
        concurrent::{
            constants::DEFAULT_INITIAL_HASH_SIZE,
            stamped_lock::{StampedLock, StampedWriteGuard},
        },
        error::CacheError,
    },
    entry::Entry,
};

/// Collision diagnostics of the table, computed by a full scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionInfo {
    /// Number of buckets holding more than one entry.
    pub collision_slot_count: usize,
    /// Number of entries that are not the head of their chain.
    pub collision_count: usize,
    /// Length of the longest chain.
    pub longest_collision_size: usize,
}

#[derive(Default)]
struct Segment {
    lock: StampedLock,
    size: AtomicUsize,
}

struct BucketArray<K, V> {
    buckets: Box<[ArcSwapOption<Entry<K, V>>]>,
}

impl<K, V> BucketArray<K, V> {
    fn with_len(len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        let buckets = (0..len).map(|_| ArcSwapOption::const_empty()).collect();
        Self { buckets }
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn bucket(&self, hash: u64) -> &ArcSwapOption<Entry<K, V>> {
        &self.buckets[(hash as usize) & (self.len() - 1)]
    }

    fn find<Q>(&self, key: &Q, hash: u64) -> Option<Arc<Entry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut current = self.bucket(hash).load_full();
        while let Some(entry) = current {
            if entry.hash() == hash && entry.key().borrow() == key {
                return Some(entry);
            }
            current = entry.another.load_full();
        }
        None
    }

    fn chain_len(&self, index: usize) -> usize {
        let mut len = 0;
        let mut current = self.buckets[index].load_full();
        while let Some(entry) = current {
            len += 1;
            current = entry.another.load_full();
        }
        len
    }

    // Links every entry into `target`, reusing the entries themselves. The
    // old array is left untouched so that readers walking it stay on acyclic
    // chains; they will fail validation and retry.
    fn rechain_into(&self, target: &BucketArray<K, V>) {
        for bucket in self.buckets.iter() {
            let mut current = bucket.load_full();
            while let Some(entry) = current {
                let next = entry.another.load_full();
                let head = target.bucket(entry.hash());
                entry.another.store(head.load_full());
                head.store(Some(Arc::clone(&entry)));
                current = next;
            }
        }
    }

    fn drain(&self) -> Vec<Arc<Entry<K, V>>> {
        let mut entries = Vec::new();
        for bucket in self.buckets.iter() {
            let mut current = bucket.swap(None);
            while let Some(entry) = current {
                current = entry.another.load_full();
                entries.push(entry);
            }
        }
        entries
    }
}

pub(crate) struct ConcurrentTable<K, V> {
    segments: Box<[CachePadded<Segment>]>,
    segment_mask: u64,
    // `None` once the table is closed.
    bucket_array: ArcSwapOption<BucketArray<K, V>>,
    load_percent: u32,
    segment_max_fill: AtomicUsize,
    #[cfg(feature = "logging")]
    cache_name: Option<String>,
}

impl<K, V> ConcurrentTable<K, V> {
    pub(crate) fn new(
        parallelism: usize,
        initial_capacity: Option<usize>,
        load_percent: u32,
        _cache_name: Option<String>,
    ) -> Self {
        let segment_count = common::segment_count(parallelism);
        let load_percent = load_percent.clamp(1, 100);
        let wanted = initial_capacity
            .map(|c| c.saturating_mul(100) / load_percent as usize)
            .unwrap_or_default();
        let len = wanted
            .max(DEFAULT_INITIAL_HASH_SIZE)
            .max(segment_count * 4)
            .checked_next_power_of_two()
            .unwrap_or(1 << (usize::BITS - 1));

        let segments = (0..segment_count)
            .map(|_| CachePadded::new(Segment::default()))
            .collect();

        Self {
            segments,
            segment_mask: segment_count as u64 - 1,
            bucket_array: ArcSwapOption::from_pointee(BucketArray::with_len(len)),
            load_percent,
            segment_max_fill: AtomicUsize::new(Self::max_fill(len, load_percent, segment_count)),
            #[cfg(feature = "logging")]
            cache_name: _cache_name,
        }
    }

    fn max_fill(len: usize, load_percent: u32, segment_count: usize) -> usize {
        (len.saturating_mul(load_percent as usize) / 100 / segment_count).max(1)
    }

    fn segment(&self, hash: u64) -> &Segment {
        &self.segments[(hash & self.segment_mask) as usize]
    }

    fn bucket_array(&self) -> Result<Arc<BucketArray<K, V>>, CacheError> {
        self.bucket_array.load_full().ok_or(CacheError::Closed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.bucket_array.load().is_none()
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the live entry for the key. The entry may turn gone at any
    /// time after it was returned.
    pub(crate) fn lookup<Q>(
        &self,
        key: &Q,
        hash: u64,
    ) -> Result<Option<Arc<Entry<K, V>>>, CacheError>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let segment = self.segment(hash);
        if let Some(stamp) = segment.lock.try_optimistic_read() {
            let found = self.bucket_array()?.find(key, hash);
            if found.is_some() || segment.lock.validate(stamp) {
                return Ok(found);
            }
        }

        let _guard = segment.lock.read();
        Ok(self.bucket_array()?.find(key, hash))
    }

    /// Inserts the entry unless an entry with the same key is already in the
    /// table. Returns the entry that ends up in the table and whether it is
    /// the given one.
    ///
    /// The segment is write-locked during the insert, so the table stays
    /// consistent even if two operations race to insert the same key. Call
    /// [`check_expand`](Self::check_expand) after a successful insert.
    pub(crate) fn insert_if_absent(
        &self,
        entry: Arc<Entry<K, V>>,
    ) -> Result<(Arc<Entry<K, V>>, bool), CacheError>
    where
        K: Eq,
    {
        let hash = entry.hash();
        let segment = self.segment(hash);
        let _guard = segment.lock.write();
        let array = self.bucket_array()?;
        if let Some(existing) = array.find(entry.key(), hash) {
            return Ok((existing, false));
        }

        let head = array.bucket(hash);
        entry.another.store(head.load_full());
        head.store(Some(Arc::clone(&entry)));
        segment.size.fetch_add(1, Ordering::AcqRel);
        Ok((entry, true))
    }

    /// Grows the bucket array when the segment of `hash` is over its target
    /// fill.
    pub(crate) fn check_expand(&self, hash: u64) {
        let max_fill = self.segment_max_fill.load(Ordering::Acquire);
        if self.segment(hash).size.load(Ordering::Acquire) <= max_fill {
            return;
        }

        let _guards = self.lock_all();
        // Another thread may have grown the array while we were waiting.
        let max_fill = self.segment_max_fill.load(Ordering::Acquire);
        if self.segment(hash).size.load(Ordering::Acquire) <= max_fill {
            return;
        }
        let Some(old) = self.bucket_array.load_full() else {
            return;
        };
        let Some(new_len) = old.len().checked_mul(2) else {
            return;
        };

        let new = BucketArray::with_len(new_len);
        old.rechain_into(&new);
        self.bucket_array.store(Some(Arc::new(new)));
        self.segment_max_fill.store(
            Self::max_fill(new_len, self.load_percent, self.segments.len()),
            Ordering::Release,
        );

        #[cfg(feature = "logging")]
        log::debug!(
            "{}Expanded the hash table from {} to {} buckets ({} entries)",
            common::log_prefix(self.cache_name.as_deref()),
            old.len(),
            new_len,
            self.size()
        );
    }

    /// Unlinks exactly this entry object from its chain. Returns `false` if it
    /// was not in the table.
    pub(crate) fn remove(&self, entry: &Entry<K, V>) -> Result<bool, CacheError> {
        let segment = self.segment(entry.hash());
        let _guard = segment.lock.write();
        let array = self.bucket_array()?;
        let head = array.bucket(entry.hash());

        let mut previous: Option<Arc<Entry<K, V>>> = None;
        let mut current = head.load_full();
        while let Some(e) = current {
            if std::ptr::eq(Arc::as_ptr(&e), entry) {
                // The removed entry keeps its link so that readers that are
                // standing on it can still reach the rest of the chain.
                let next = e.another.load_full();
                match &previous {
                    None => head.store(next),
                    Some(p) => p.another.store(next),
                }
                segment.size.fetch_sub(1, Ordering::AcqRel);
                return Ok(true);
            }
            current = e.another.load_full();
            previous = Some(e);
        }
        Ok(false)
    }

    /// Number of entries, as tracked by the segment counters.
    pub(crate) fn size(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.size.load(Ordering::Acquire))
            .sum()
    }

    /// Removes all entries and returns them.
    pub(crate) fn clear(&self) -> Result<Vec<Arc<Entry<K, V>>>, CacheError> {
        let _guards = self.lock_all();
        let array = self.bucket_array()?;
        let entries = array.drain();
        self.reset_sizes();
        Ok(entries)
    }

    /// Closes the table and returns the entries it held. Every later operation
    /// fails with `CacheError::Closed`.
    pub(crate) fn close(&self) -> Vec<Arc<Entry<K, V>>> {
        let _guards = self.lock_all();
        let entries = match self.bucket_array.swap(None) {
            Some(array) => array.drain(),
            None => return Vec::new(),
        };
        self.reset_sizes();

        #[cfg(feature = "logging")]
        log::debug!(
            "{}Closed the hash table ({} entries dropped)",
            common::log_prefix(self.cache_name.as_deref()),
            entries.len()
        );

        entries
    }

    /// Counts the entries by walking every chain.
    pub(crate) fn calc_entry_count(&self) -> Result<usize, CacheError> {
        let _guards = self.lock_all();
        let array = self.bucket_array()?;
        Ok((0..array.len()).map(|i| array.chain_len(i)).sum())
    }

    pub(crate) fn collision_info(&self) -> Result<CollisionInfo, CacheError> {
        let _guards = self.lock_all();
        let array = self.bucket_array()?;
        let mut info = CollisionInfo::default();
        for i in 0..array.len() {
            let len = array.chain_len(i);
            if len > 1 {
                info.collision_slot_count += 1;
                info.collision_count += len - 1;
            }
            info.longest_collision_size = info.longest_collision_size.max(len);
        }
        Ok(info)
    }

    /// Counts the entries whose key is held by an earlier entry of the same
    /// chain.
    pub(crate) fn duplicated_keys(&self) -> Result<usize, CacheError>
    where
        K: Eq,
    {
        let _guards = self.lock_all();
        let array = self.bucket_array()?;
        let mut duplicates = 0;
        for i in 0..array.len() {
            let mut seen: Vec<Arc<Entry<K, V>>> = Vec::new();
            let mut current = array.buckets[i].load_full();
            while let Some(entry) = current {
                if seen.iter().any(|s| s.key() == entry.key()) {
                    duplicates += 1;
                }
                current = entry.another.load_full();
                seen.push(entry);
            }
        }
        Ok(duplicates)
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.bucket_array.load().as_ref().map_or(0, |a| a.len())
    }

    fn reset_sizes(&self) {
        for segment in self.segments.iter() {
            segment.size.store(0, Ordering::Release);
        }
    }

    // Segments are locked in index order.
    fn lock_all(&self) -> SmallVec<[StampedWriteGuard<'_>; 16]> {
        self.segments.iter().map(|s| s.lock.write()).collect()
    }
}
