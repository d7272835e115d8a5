//! In-memory storage for the cache.
//!
//! Two layers, mirroring how the record semantics are shared while the
//! concurrency strategy is swappable:
//!
//! - [`StorageEngine`]: the raw concurrent key→record map, with two
//!   interchangeable implementations ([`engines::MutexMapEngine`],
//!   [`engines::SyncMapEngine`]) selected by the `cache_type` option
//! - [`MemoryStore`]: encoding, ttl→expiry conversion, and lazy expiry on
//!   top of whichever engine was selected

pub mod engine;
pub mod engines;
pub mod factory;
pub mod store;

pub use engine::StorageEngine;
pub use factory::{create_engine, MUTEX_MAP, SYNC_MAP};
pub use store::MemoryStore;
