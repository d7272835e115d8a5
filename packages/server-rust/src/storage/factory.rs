//! Engine selection by configured cache type.

use crate::error::CacheError;
use crate::storage::engine::StorageEngine;
use crate::storage::engines::{MutexMapEngine, SyncMapEngine};

/// The lock-based in-memory store variant.
pub const MUTEX_MAP: &str = "mutex-map";
/// The concurrent-map in-memory store variant.
pub const SYNC_MAP: &str = "sync-map";

/// Creates the engine named by `cache_type`.
///
/// # Errors
///
/// Returns [`CacheError::InvalidProvider`] for anything other than
/// `mutex-map` or `sync-map`.
pub fn create_engine(cache_type: &str) -> Result<Box<dyn StorageEngine>, CacheError> {
    match cache_type {
        MUTEX_MAP => Ok(Box::new(MutexMapEngine::new())),
        SYNC_MAP => Ok(Box::new(SyncMapEngine::new())),
        other => Err(CacheError::InvalidProvider(other.to_string())),
    }
}
