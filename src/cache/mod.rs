//! 缓存存储模块
//!
//! 键编码、存储抽象以及进程内 / rat_memcache 两种实现

pub mod keys;
pub mod memcache_store;
pub mod memory_store;
pub mod slot_store;
pub mod stats;
pub mod store;

pub use keys::{ParsedQueryKey, parse_query_key};
pub use memcache_store::{RatMemCacheBackend, RatMemCacheStore};
pub use memory_store::{MemoryBackend, MemoryCacheStore};
pub use slot_store::{Slot, SlotBackend, SlotCacheStore, SlotValue};
pub use stats::{CacheCounters, CacheStats};
pub use store::{CacheStore, InvalidationOp, QueryEntry};
