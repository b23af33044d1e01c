#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Cachet is a bounded, thread-safe, in-process cache.
//!
//! A [`Cache`][cache-struct] stores its entries in a segmented hash table
//! whose reads never take a lock in the common case. When the number of
//! entries exceeds the max capacity, entries are evicted in small batches
//! chosen by a pluggable [replacement strategy][strategy-trait].
//!
//! Every cache method is one operation against a single entry: it examines
//! the entry and, when it has to change it, takes the entry's processing
//! right so that changes to the same key never interleave. Values can be
//! loaded on demand through a [`Loader`][loader-trait], changed atomically by
//! entry processors ([`Cache::invoke`][invoke]), and expired with an
//! [`ExpiryTime`][expiry-time].
//!
//! [cache-struct]: ./struct.Cache.html
//! [strategy-trait]: ./strategy/trait.ReplacementStrategy.html
//! [loader-trait]: ./trait.Loader.html
//! [invoke]: ./struct.Cache.html#method.invoke
//! [expiry-time]: ./enum.ExpiryTime.html
//!
//! # Examples
//!
//! ```rust
//! use cachet::{Cache, EvictionPolicy, RemovalCause};
//!
//! use std::sync::{Arc, Mutex};
//!
//! let evicted = Arc::new(Mutex::new(Vec::new()));
//! let evicted1 = Arc::clone(&evicted);
//!
//! let cache = Cache::builder()
//!     .max_capacity(2)
//!     .eviction_policy(EvictionPolicy::fifo())
//!     .removal_listener(move |k: Arc<u32>, _v: String, cause| {
//!         if cause == RemovalCause::Size {
//!             evicted1.lock().unwrap().push(*k);
//!         }
//!     })
//!     .build();
//!
//! cache.put(1, "one".to_string()).unwrap();
//! cache.put(2, "two".to_string()).unwrap();
//! cache.put(3, "three".to_string()).unwrap();
//!
//! assert_eq!(cache.entry_count(), 2);
//! assert_eq!(*evicted.lock().unwrap(), vec![1]);
//!
//! // Change a value atomically.
//! let previous = cache
//!     .invoke(2, false, |e| {
//!         let previous = e.value()?;
//!         e.set_value("deux".to_string());
//!         Ok(previous)
//!     })
//!     .unwrap();
//! assert_eq!(previous, Some("two".to_string()));
//! ```
//!
//! # Minimum Supported Rust Versions
//!
//! This crate's minimum supported Rust versions (MSRV) are the followings:
//!
//! | Feature          | MSRV                       |
//! |:-----------------|:--------------------------:|
//! | default features | Rust 1.65.0 (Nov 3, 2022)  |

pub(crate) mod builder;
pub(crate) mod cache;
pub(crate) mod common;
pub(crate) mod entry;
pub(crate) mod eviction;
pub(crate) mod expiry;
pub(crate) mod loader;
pub mod notification;
pub(crate) mod operation;
pub(crate) mod policy;
pub(crate) mod stats;
pub(crate) mod table;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use common::{
    entry::CacheEntry,
    error::{CacheError, ErrorObject, IntegrityError},
};
pub use eviction::strategy;
pub use expiry::ExpiryTime;
pub use loader::Loader;
pub use notification::RemovalCause;
pub use operation::{
    processor::{MutableEntry, ProcessorError},
    progress::{ExaminationEntry, Progress},
    semantic::{Semantic, SemanticKind},
};
pub use policy::{EvictionPolicy, Policy};
pub use stats::{CacheStats, EvictionMetrics};
pub use table::CollisionInfo;
