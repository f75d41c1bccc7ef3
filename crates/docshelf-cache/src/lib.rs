//! # docshelf-cache
//!
//! Read-through cache for docshelf query results, invalidated by tag.
//!
//! Entries are keyed by a [`CacheKey`] and tagged with [`CacheTag`]s. Writers
//! call [`CacheCoordinator::invalidate`] after the system of record changes;
//! readers go through [`CacheCoordinator::read_through`]. The store is Redis
//! when reachable and an in-process LRU otherwise.

pub mod config;
pub mod coordinator;
pub mod keys;
pub mod memory_store;
pub mod redis_store;
pub mod stats;

pub use config::CacheConfig;
pub use coordinator::CacheCoordinator;
pub use keys::{canonical_tags, CacheKey, CacheTag};
pub use memory_store::MemoryCacheStore;
pub use redis_store::RedisCacheStore;
pub use stats::CacheStats;
