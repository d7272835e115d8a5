//! Cacher server -- an in-memory TTL key/value cache with two durability
//! mechanisms: periodic full-state snapshots on an embedded on-disk store
//! and an append-only operation log. On restart the cache replays the
//! snapshot, then every logged `pending` entry newer than the snapshot
//! sentinel.

pub mod config;
pub mod error;
pub mod manager;
pub mod network;
pub mod persistence;
pub mod storage;

pub use error::CacheError;
pub use manager::{CacheManager, CacheOptions};
pub use storage::{MemoryStore, StorageEngine};
