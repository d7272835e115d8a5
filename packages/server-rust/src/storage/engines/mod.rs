//! Interchangeable [`StorageEngine`](super::StorageEngine) implementations.

pub mod mutex_map;
pub mod sync_map;

pub use mutex_map::MutexMapEngine;
pub use sync_map::SyncMapEngine;
