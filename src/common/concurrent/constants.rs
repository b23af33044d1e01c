pub(crate) const MINIMAL_CHUNK_SIZE: usize = 4;
pub(crate) const MAXIMAL_CHUNK_SIZE: usize = 64;

// Below this capacity every eviction pass removes exactly one entry.
pub(crate) const MINIMUM_CAPACITY_FOR_CHUNKING: u64 = 1_000;

pub(crate) const DEFAULT_INITIAL_HASH_SIZE: usize = 64;
pub(crate) const DEFAULT_HASH_LOAD_PERCENT: u32 = 50;
