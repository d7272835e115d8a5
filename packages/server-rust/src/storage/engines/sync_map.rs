//! [`StorageEngine`] built on [`DashMap`].
//!
//! The `sync-map` cache type. `DashMap` shards the keyspace and coordinates
//! per-entry, so readers and writers on different keys never contend.

use dashmap::DashMap;

use cacher_core::Record;

use crate::storage::engine::StorageEngine;

/// Concurrent-map engine with internal per-entry coordination.
#[derive(Debug, Default)]
pub struct SyncMapEngine {
    entries: DashMap<String, Record>,
}

impl SyncMapEngine {
    /// Creates a new, empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for SyncMapEngine {
    fn put(&self, key: &str, record: Record) {
        self.entries.insert(key.to_string(), record);
    }

    fn get(&self, key: &str) -> Option<Record> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: &str) -> Record {
        Record {
            value: value.to_string(),
            expired_at: 0,
        }
    }

    #[test]
    fn put_get_remove_round_trip() {
        let engine = SyncMapEngine::new();

        assert!(engine.get("k").is_none());

        engine.put("k", record("\"v\""));
        assert_eq!(engine.get("k").unwrap().value, "\"v\"");

        engine.remove("k");
        assert!(engine.get("k").is_none());
    }

    #[test]
    fn put_replaces_existing_record() {
        let engine = SyncMapEngine::new();
        engine.put("k", record("1"));
        engine.put("k", record("2"));

        assert_eq!(engine.get("k").unwrap().value, "2");
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn keys_lists_every_stored_key() {
        let engine = SyncMapEngine::new();
        engine.put("a", record("1"));
        engine.put("b", record("2"));
        engine.remove("a");

        assert_eq!(engine.keys(), vec!["b"]);
    }

    #[test]
    fn concurrent_writers_leave_one_winner() {
        use std::sync::Arc;

        let engine = Arc::new(SyncMapEngine::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for j in 0..100 {
                        engine.put("shared", record(&format!("{}", i * 100 + j)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let survivor = engine.get("shared").unwrap();
        let n: i64 = survivor.value.parse().unwrap();
        assert!((0..800).contains(&n));
        assert_eq!(engine.len(), 1);
    }
}
