//! [`StorageEngine`] built on a read/write lock around a plain map.
//!
//! The `mutex-map` cache type. Writers take the exclusive side of a
//! [`parking_lot::RwLock`]; readers share the read side, so lookups never
//! block each other.

use std::collections::HashMap;

use parking_lot::RwLock;

use cacher_core::Record;

use crate::storage::engine::StorageEngine;

/// Lock-based engine: single writer, many readers.
#[derive(Debug, Default)]
pub struct MutexMapEngine {
    entries: RwLock<HashMap<String, Record>>,
}

impl MutexMapEngine {
    /// Creates a new, empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MutexMapEngine {
    fn put(&self, key: &str, record: Record) {
        self.entries.write().insert(key.to_string(), record);
    }

    fn get(&self, key: &str) -> Option<Record> {
        self.entries.read().get(key).cloned()
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
