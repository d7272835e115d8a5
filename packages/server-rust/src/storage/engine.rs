//! Low-level in-memory storage engine trait.
//!
//! Defines [`StorageEngine`], the innermost storage layer: a keyed mapping
//! from string to [`Record`]. Implementations only differ in how they
//! coordinate concurrent access; record-level semantics (encoding, ttl,
//! lazy expiry) live one layer up in
//! [`MemoryStore`](crate::storage::MemoryStore).

use std::fmt::Debug;

use cacher_core::Record;

/// Concurrent map of keys to records.
///
/// `put` and `remove` are mutually exclusive with each other and with
/// `keys`; any number of `get`s may proceed in parallel, and a `get` that
/// races a writer observes either the old or the new record, never a torn
/// pair. Used as `Box<dyn StorageEngine>` behind the manager.
pub trait StorageEngine: Send + Sync + Debug + 'static {
    /// Insert or replace the record under `key`.
    fn put(&self, key: &str, record: Record);

    /// Retrieve a clone of the record under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Option<Record>;

    /// Remove any record under `key`. Absence is not an error.
    fn remove(&self, key: &str);

    /// All currently stored keys, in no particular order.
    ///
    /// Expired-but-unobserved records are included; only `remove` takes a
    /// key out of the listing.
    fn keys(&self) -> Vec<String>;

    /// Number of stored records, expired ones included.
    fn len(&self) -> usize;

    /// Whether the engine holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
