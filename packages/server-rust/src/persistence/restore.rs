//! Startup restore: snapshot first, then the operation log.
//!
//! Both passes run under the manager's restore-mode guard so no replayed
//! mutation is appended back to the log. Snapshot records carry an absolute
//! expiry and are reinserted as-is via the store's absolute-expiry path;
//! records already expired at restore time are dropped instead of
//! resurrected.

use serde_json::Value;
use tracing::{info, warn};

use cacher_core::{is_expired, unix_now, Command, SnapshotRecord, SENTINEL_KEY};

use crate::error::CacheError;
use crate::manager::CacheManager;

/// Replays the full snapshot into the in-memory store.
///
/// The snapshot iterator emits the reserved sentinel key; it is skipped so
/// it never shows up in the live keyspace. Returns the number of records
/// restored.
///
/// # Errors
///
/// Fails if the snapshot store cannot be read or a record cannot be
/// reinserted.
pub fn restore_from_cdb(manager: &CacheManager) -> Result<usize, CacheError> {
    let Some(cdb) = manager.snapshot_store() else {
        return Ok(0);
    };

    let _guard = manager.enter_restore();
    let now = unix_now();
    let mut restored = 0usize;

    for (key, blob) in cdb.snapshot_iter()? {
        if key == SENTINEL_KEY {
            continue;
        }
        let record: SnapshotRecord = match serde_json::from_str(&blob) {
            Ok(record) => record,
            Err(err) => {
                warn!(key, error = %err, "skipping undecodable snapshot record");
                continue;
            }
        };
        if is_expired(record.expired_at, now) {
            continue;
        }
        manager
            .memory_store()
            .set_at(&key, &record.value, record.expired_at)?;
        restored += 1;
    }

    info!("CDB: restored {restored} records");
    Ok(restored)
}

/// Replays logged `pending` commands newer than the snapshot sentinel.
///
/// When the snapshot store is disabled (or its sentinel absent) the whole
/// log is replayed. Commands are dispatched through the manager, so
/// post-snapshot mutations are mirrored back into the snapshot store while
/// log emission stays suppressed. Returns the number of commands applied.
///
/// # Errors
///
/// Fails if the log cannot be read or a replayed mutation fails.
pub fn restore_from_aof(manager: &CacheManager) -> Result<usize, CacheError> {
    let Some(aof) = manager.aof_sink() else {
        return Ok(0);
    };

    let from = manager
        .snapshot_store()
        .map_or(0, super::cdb::SnapshotStore::last_snapshot_timestamp);
    let outcome = aof.replay(from)?;
    if outcome.skipped > 0 {
        warn!("AOF: skipped {} malformed lines during replay", outcome.skipped);
    }

    let _guard = manager.enter_restore();
    let mut applied = 0usize;

    for command in outcome.commands {
        match command {
            Command::Set { key, value, ttl } => {
                let decoded: Value = match serde_json::from_str(&value) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        warn!(key, error = %err, "skipping log entry with undecodable value");
                        continue;
                    }
                };
                manager.set(&key, &decoded, ttl)?;
            }
            Command::Delete { key } => {
                manager.delete(&key)?;
            }
        }
        applied += 1;
    }

    info!("AOF: applied {applied} commands");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use serde_json::json;

    use crate::manager::{CacheManager, CacheOptions};
    use crate::storage::MUTEX_MAP;

    fn options(data_dir: &Path, cdb: bool, cdb_period: i64, aof: bool) -> CacheOptions {
        CacheOptions {
            cache_type: MUTEX_MAP.to_string(),
            cdb_enabled: cdb,
            cdb_period,
            aof_enabled: aof,
            data_dir: data_dir.to_path_buf(),
        }
    }

    #[test]
    fn snapshot_restore_round_trips_values_and_expiries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = CacheManager::new(&options(dir.path(), true, 0, false)).unwrap();
            manager.set("a", &json!(1), 0).unwrap();
            manager.set("b", &json!("x"), 60).unwrap();
            manager.close().unwrap();
        }

        let manager = CacheManager::new(&options(dir.path(), true, 0, false)).unwrap();
        let (a, a_expiry) = manager.get("a").unwrap().unwrap();
        assert_eq!(a, json!(1));
        assert_eq!(a_expiry, 0);

        let (b, b_expiry) = manager.get("b").unwrap().unwrap();
        assert_eq!(b, json!("x"));
        let expected = cacher_core::unix_now() + 60;
        // The stored expiry is absolute and survives the restart unchanged.
        assert!((b_expiry - expected).abs() <= 2);
    }

    #[test]
    fn sentinel_never_reaches_the_live_keyspace() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = CacheManager::new(&options(dir.path(), true, 0, false)).unwrap();
            manager.set("only", &json!(true), 0).unwrap();
            manager.close().unwrap();
        }

        let manager = CacheManager::new(&options(dir.path(), true, 0, false)).unwrap();
        assert_eq!(manager.keys(), vec!["only"]);
    }

    #[test]
    fn expired_snapshot_records_are_dropped_on_restore() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = CacheManager::new(&options(dir.path(), true, 0, false)).unwrap();
            manager.set("ephemeral", &json!("soon gone"), 1).unwrap();
            manager.set("durable", &json!("stays"), 0).unwrap();
            manager.close().unwrap();
        }

        std::thread::sleep(Duration::from_millis(1100));

        let manager = CacheManager::new(&options(dir.path(), true, 0, false)).unwrap();
        assert_eq!(manager.keys(), vec!["durable"]);
        assert!(manager.get("ephemeral").unwrap().is_none());
    }

    #[test]
    fn log_replay_reapplies_pending_mutations_in_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = CacheManager::new(&options(dir.path(), false, 0, true)).unwrap();
            manager.set("kept", &json!({"n": 1}), 0).unwrap();
            manager.set("gone", &json!(2), 0).unwrap();
            manager.delete("gone").unwrap();
            // Dropped without close: the log alone carries the state.
        }

        let manager = CacheManager::new(&options(dir.path(), false, 0, true)).unwrap();
        assert_eq!(manager.get("kept").unwrap().unwrap().0, json!({"n": 1}));
        assert!(manager.get("gone").unwrap().is_none());
    }

    #[test]
    fn replay_does_not_grow_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("aof").join("aof.log");
        {
            let manager = CacheManager::new(&options(dir.path(), false, 0, true)).unwrap();
            manager.set("a", &json!(1), 0).unwrap();
            manager.set("b", &json!(2), 0).unwrap();
        }
        let before = std::fs::read_to_string(&log_path).unwrap().lines().count();

        let manager = CacheManager::new(&options(dir.path(), false, 0, true)).unwrap();
        assert_eq!(manager.keys().len(), 2);

        let after = std::fs::read_to_string(&log_path).unwrap().lines().count();
        assert_eq!(before, after);
    }
}
