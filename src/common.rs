pub(crate) mod concurrent;
pub(crate) mod deque;
pub(crate) mod entry;
pub(crate) mod error;
pub(crate) mod time;

use std::{num::NonZeroUsize, thread::available_parallelism as std_available_parallelism};

use self::concurrent::constants::{
    MAXIMAL_CHUNK_SIZE, MINIMAL_CHUNK_SIZE, MINIMUM_CAPACITY_FOR_CHUNKING,
};

/// Returns the parallelism reported by the runtime, falling back to 1 when it
/// cannot be determined.
pub(crate) fn available_parallelism() -> usize {
    std_available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// The `[name] ` prefix of the log lines of a named cache.
#[cfg(feature = "logging")]
pub(crate) fn log_prefix(cache_name: Option<&str>) -> String {
    cache_name
        .map(|name| format!("[{name}] "))
        .unwrap_or_default()
}

/// Number of lock segments for the given parallelism: twice the highest power of
/// two not greater than `parallelism`.
pub(crate) fn segment_count(parallelism: usize) -> usize {
    let p = parallelism.max(1);
    2usize << (usize::BITS - 1 - p.leading_zeros())
}

/// Number of entries collected per eviction pass.
///
/// Small caches evict one entry at a time. Larger ones batch the work, scaling
/// with parallelism but never leaving `MINIMAL_CHUNK_SIZE..=MAXIMAL_CHUNK_SIZE`.
pub(crate) fn eviction_chunk_size(max_capacity: u64, parallelism: usize) -> usize {
    if max_capacity < MINIMUM_CAPACITY_FOR_CHUNKING {
        1
    } else {
        (MINIMAL_CHUNK_SIZE + parallelism.max(1) - 1).min(MAXIMAL_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::{eviction_chunk_size, segment_count};

    #[test]
    fn segment_count_is_power_of_two() {
        assert_eq!(segment_count(1), 2);
        assert_eq!(segment_count(2), 4);
        assert_eq!(segment_count(3), 4);
        assert_eq!(segment_count(8), 16);
        assert_eq!(segment_count(12), 16);
        assert_eq!(segment_count(0), 2);
    }

    #[test]
    fn chunk_size_bounds() {
        assert_eq!(eviction_chunk_size(100, 16), 1);
        assert_eq!(eviction_chunk_size(999, 64), 1);
        assert_eq!(eviction_chunk_size(1_000, 1), 4);
        assert_eq!(eviction_chunk_size(1_000, 8), 11);
        assert_eq!(eviction_chunk_size(u64::MAX, 1_000), 64);
    }
}
