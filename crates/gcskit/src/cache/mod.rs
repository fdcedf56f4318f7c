//! Client-side caches.
//!
//! - [`TtlCache`]: generic age-bounded map backing the stat, matching-paths,
//!   and bucket-location caches.
//! - [`BlockCache`]: the read-side block cache with per-file signature
//!   invalidation and LRU eviction.

mod block;
mod ttl;

pub use block::{BlockCache, Signature};
pub use ttl::TtlCache;
