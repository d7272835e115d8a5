//! The cache manager: the façade over the in-memory store, the append-only
//! log, and the snapshot store.
//!
//! Mutations follow a three-phase log discipline: a `pending` line before
//! the in-memory operation, a `completed` or `failed` line after it, then a
//! mirror into the snapshot store. The in-memory mutation is authoritative
//! for the running process: a log append failure is reported and swallowed,
//! a snapshot failure is surfaced after the fact.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::error;

use cacher_core::OpState;

use crate::error::CacheError;
use crate::persistence::aof::AofSink;
use crate::persistence::cdb::SnapshotStore;
use crate::persistence::restore::{restore_from_aof, restore_from_cdb};
use crate::storage::{create_engine, MemoryStore, MUTEX_MAP};

/// Construction options for [`CacheManager::new`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Which in-memory engine to use: `mutex-map` or `sync-map`.
    pub cache_type: String,
    /// Whether to keep an on-disk snapshot of the keyspace.
    pub cdb_enabled: bool,
    /// Snapshot write discipline: ≤ 0 commits directly, > 0 batches and
    /// flushes every this many seconds.
    pub cdb_period: i64,
    /// Whether to append every mutation to the operation log.
    pub aof_enabled: bool,
    /// Root of the on-disk layout (`<data_dir>/cdb/`, `<data_dir>/aof/`).
    pub data_dir: PathBuf,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_type: MUTEX_MAP.to_string(),
            cdb_enabled: true,
            cdb_period: 60,
            aof_enabled: false,
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Composes the in-memory store with both durability mechanisms and owns
/// the restore-mode flag that keeps replay from re-logging its own effects.
#[derive(Debug)]
pub struct CacheManager {
    store: MemoryStore,
    cdb: Option<SnapshotStore>,
    aof: Option<AofSink>,
    restore_mode: AtomicBool,
}

impl CacheManager {
    /// Builds a manager and reconstructs its state: snapshot first, then
    /// every logged `pending` entry newer than the snapshot sentinel.
    ///
    /// With a positive `cdb_period` this spawns the background flusher and
    /// must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails on an unknown cache type, on store initialization, or on a
    /// restore that cannot read its inputs.
    pub fn new(options: &CacheOptions) -> Result<Self, CacheError> {
        let cdb = if options.cdb_enabled {
            Some(SnapshotStore::open(
                options.data_dir.join("cdb"),
                options.cdb_period,
            )?)
        } else {
            None
        };
        let aof = if options.aof_enabled {
            Some(AofSink::open(options.data_dir.join("aof").join("aof.log"))?)
        } else {
            None
        };
        let engine = create_engine(&options.cache_type)?;

        let manager = Self {
            store: MemoryStore::new(engine),
            cdb,
            aof,
            restore_mode: AtomicBool::new(false),
        };

        if manager.cdb.is_some() {
            restore_from_cdb(&manager)?;
        }
        if manager.aof.is_some() {
            restore_from_aof(&manager)?;
        }
        Ok(manager)
    }

    /// Stores `value` under `key` with a relative ttl (0 = never expires).
    ///
    /// # Errors
    ///
    /// Fails if the value cannot be encoded or, after the in-memory write
    /// already succeeded, if a direct-mode snapshot commit fails.
    pub fn set(&self, key: &str, value: &Value, ttl_seconds: i64) -> Result<(), CacheError> {
        let log_value = if self.logging() {
            Some(serde_json::to_string(value)?)
        } else {
            None
        };

        if let Some(encoded) = &log_value {
            self.log_set(key, encoded, ttl_seconds, OpState::Pending);
        }
        let result = self.store.set(key, value, ttl_seconds);
        if let Some(encoded) = &log_value {
            let state = if result.is_ok() {
                OpState::Completed
            } else {
                OpState::Failed
            };
            self.log_set(key, encoded, ttl_seconds, state);
        }
        result?;

        if let Some(cdb) = &self.cdb {
            cdb.set(key, value, ttl_seconds)?;
        }
        Ok(())
    }

    /// Looks up `key`, returning the decoded value and its absolute expiry.
    /// Absent and expired keys both come back as `None`.
    ///
    /// # Errors
    ///
    /// Fails if the stored record no longer decodes.
    pub fn get(&self, key: &str) -> Result<Option<(Value, i64)>, CacheError> {
        self.store.get(key)
    }

    /// Removes `key` from the cache. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Fails only if the snapshot mirror fails after the in-memory removal.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        let logging = self.logging();
        if logging {
            self.log_delete(key, OpState::Pending);
        }
        self.store.delete(key);
        if logging {
            self.log_delete(key, OpState::Completed);
        }

        if let Some(cdb) = &self.cdb {
            cdb.delete(key)?;
        }
        Ok(())
    }

    /// Every currently stored key, in no particular order. Keys whose ttl
    /// has passed but that no reader has observed yet are included.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Flushes the snapshot store and stops its background flusher.
    ///
    /// # Errors
    ///
    /// Surfaces the final snapshot commit failure.
    pub fn close(&self) -> Result<(), CacheError> {
        if let Some(cdb) = &self.cdb {
            cdb.close()?;
        }
        Ok(())
    }

    fn logging(&self) -> bool {
        self.aof.is_some() && !self.restore_mode.load(Ordering::SeqCst)
    }

    // Log failures must not alter the in-memory outcome, so they are
    // reported here instead of propagated.
    fn log_set(&self, key: &str, encoded: &str, ttl_seconds: i64, state: OpState) {
        if let Some(aof) = &self.aof {
            if let Err(err) = aof.write_set(key, encoded, ttl_seconds, state) {
                error!(key, error = %err, "failed to append set entry to the operation log");
            }
        }
    }

    fn log_delete(&self, key: &str, state: OpState) {
        if let Some(aof) = &self.aof {
            if let Err(err) = aof.write_delete(key, state) {
                error!(key, error = %err, "failed to append delete entry to the operation log");
            }
        }
    }

    pub(crate) fn memory_store(&self) -> &MemoryStore {
        &self.store
    }

    pub(crate) fn snapshot_store(&self) -> Option<&SnapshotStore> {
        self.cdb.as_ref()
    }

    pub(crate) fn aof_sink(&self) -> Option<&AofSink> {
        self.aof.as_ref()
    }

    /// Raises the restore-mode flag for the lifetime of the returned guard,
    /// suppressing log emission for every mutation issued meanwhile.
    pub(crate) fn enter_restore(&self) -> RestoreGuard<'_> {
        self.restore_mode.store(true, Ordering::SeqCst);
        RestoreGuard {
            flag: &self.restore_mode,
        }
    }
}

/// Clears the restore-mode flag on drop, even if replay bails out early.
pub(crate) struct RestoreGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::SYNC_MAP;

    fn ephemeral(cache_type: &str) -> CacheManager {
        CacheManager::new(&CacheOptions {
            cache_type: cache_type.to_string(),
            cdb_enabled: false,
            cdb_period: 0,
            aof_enabled: false,
            data_dir: PathBuf::from("./unused"),
        })
        .unwrap()
    }

    #[test]
    fn unknown_cache_type_fails_with_message() {
        let err = CacheManager::new(&CacheOptions {
            cache_type: "wrong_provider".to_string(),
            cdb_enabled: false,
            cdb_period: 0,
            aof_enabled: false,
            data_dir: PathBuf::from("./unused"),
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Cache Provider 'wrong_provider' is invalid.");
    }

    #[test]
    fn both_cache_types_construct() {
        for cache_type in [MUTEX_MAP, SYNC_MAP] {
            let manager = ephemeral(cache_type);
            manager.set("k", &json!(1), 0).unwrap();
            assert_eq!(manager.get("k").unwrap().unwrap().0, json!(1));
        }
    }

    #[test]
    fn set_get_delete_round_trip_without_durability() {
        let manager = ephemeral(MUTEX_MAP);

        assert!(manager.get("k").unwrap().is_none());

        manager.set("k", &json!({"a": [1, 2]}), 0).unwrap();
        let (value, expired_at) = manager.get("k").unwrap().unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));
        assert_eq!(expired_at, 0);

        manager.delete("k").unwrap();
        assert!(manager.get("k").unwrap().is_none());
    }

    #[test]
    fn keys_follow_sets_and_deletes() {
        let manager = ephemeral(SYNC_MAP);
        manager.set("a", &json!(1), 0).unwrap();
        manager.set("b", &json!(2), 0).unwrap();
        manager.delete("a").unwrap();

        assert_eq!(manager.keys(), vec!["b"]);
    }

    #[test]
    fn mutations_append_pending_and_terminal_lines() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(&CacheOptions {
            cache_type: MUTEX_MAP.to_string(),
            cdb_enabled: false,
            cdb_period: 0,
            aof_enabled: true,
            data_dir: dir.path().to_path_buf(),
        })
        .unwrap();

        manager.set("k", &json!("v"), 5).unwrap();
        manager.delete("k").unwrap();

        let log = std::fs::read_to_string(dir.path().join("aof").join("aof.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("set k \"v\" 5 - pending"));
        assert!(lines[1].ends_with("set k \"v\" 5 - completed"));
        assert!(lines[2].ends_with("delete k - pending"));
        assert!(lines[3].ends_with("delete k - completed"));
    }

    #[test]
    fn restore_guard_clears_flag_on_drop() {
        let manager = ephemeral(MUTEX_MAP);
        {
            let _guard = manager.enter_restore();
            assert!(!manager.logging() || manager.aof.is_none());
            assert!(manager.restore_mode.load(Ordering::SeqCst));
        }
        assert!(!manager.restore_mode.load(Ordering::SeqCst));
    }
}
