//! Snapshot store (CDB) over an embedded ordered key/value store.
//!
//! Wraps a [`redb`] database holding one table of user keys mapped to
//! JSON-encoded [`SnapshotRecord`]s. Two write disciplines:
//!
//! - **Direct mode** (period ≤ 0): every mutation commits immediately, with
//!   the sentinel refreshed in the same transaction.
//! - **Batched mode** (period > 0): mutations accumulate in an in-memory
//!   batch; a background flusher wakes every `period` seconds, refreshes the
//!   sentinel, and commits the whole batch in one transaction.
//!
//! The reserved sentinel key records the wall clock of the most recent
//! flush; restore uses it to decide which log entries are newer than the
//! snapshot.

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use cacher_core::{unix_now, SnapshotRecord, SENTINEL_KEY};

use crate::error::CacheError;

const RECORDS: TableDefinition<&str, &str> = TableDefinition::new("records");

/// A mutation queued for the next batched commit.
#[derive(Debug)]
enum BatchOp {
    Put { key: String, blob: String },
    Delete { key: String },
}

/// The snapshot store handle.
///
/// In batched mode, [`SnapshotStore::open`] spawns the background flusher
/// and therefore must be called from within a tokio runtime.
#[derive(Debug)]
pub struct SnapshotStore {
    db: Arc<Database>,
    batch: Option<Arc<Mutex<Vec<BatchOp>>>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl SnapshotStore {
    /// Opens (or creates) the store under `dir` and logs its record count.
    ///
    /// A positive `period_seconds` selects batched mode and starts the
    /// background flusher; zero or less selects direct mode.
    ///
    /// # Errors
    ///
    /// Fails if the directory or database file cannot be created or read.
    pub fn open(dir: impl AsRef<Path>, period_seconds: i64) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db = Arc::new(Database::create(dir.join("cdb.redb"))?);

        // Create the table up front so read transactions can always open it.
        let init = db.begin_write()?;
        init.open_table(RECORDS)?;
        init.commit()?;

        let read = db.begin_read()?;
        let table = read.open_table(RECORDS)?;
        let count = table.iter()?.count();
        info!("CDB contains {count} records");

        let (batch, shutdown) = if period_seconds > 0 {
            let batch = Arc::new(Mutex::new(Vec::new()));
            let (tx, rx) = watch::channel(false);
            spawn_flusher(
                Arc::downgrade(&db),
                Arc::clone(&batch),
                u64::try_from(period_seconds).unwrap_or(1),
                rx,
            );
            (Some(batch), Some(tx))
        } else {
            (None, None)
        };

        Ok(Self { db, batch, shutdown })
    }

    /// Composes a snapshot record for `value` under the usual ttl rule and
    /// writes it directly or enqueues it, depending on the mode.
    ///
    /// # Errors
    ///
    /// Surfaces encoding failures and, in direct mode, commit failures.
    pub fn set(&self, key: &str, value: &Value, ttl_seconds: i64) -> Result<(), CacheError> {
        let record = SnapshotRecord::new(value.clone(), ttl_seconds);
        let blob = serde_json::to_string(&record)?;
        self.apply(BatchOp::Put {
            key: key.to_string(),
            blob,
        })
    }

    /// Removes `key` from the store, directly or via the batch.
    ///
    /// # Errors
    ///
    /// Surfaces commit failures in direct mode.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.apply(BatchOp::Delete {
            key: key.to_string(),
        })
    }

    fn apply(&self, op: BatchOp) -> Result<(), CacheError> {
        match &self.batch {
            Some(batch) => {
                batch.lock().push(op);
                Ok(())
            }
            None => commit_ops(&self.db, std::slice::from_ref(&op)),
        }
    }

    /// Materializes the entire on-disk store as `(key, encoded record)`
    /// pairs in key order. Used only by restore; the sentinel is included
    /// and the caller must skip its reserved key.
    ///
    /// # Errors
    ///
    /// Surfaces read failures from the underlying store.
    pub fn snapshot_iter(&self) -> Result<Vec<(String, String)>, CacheError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        let mut entries = Vec::new();
        for row in table.iter()? {
            let (key, value) = row?;
            entries.push((key.value().to_string(), value.value().to_string()));
        }
        Ok(entries)
    }

    /// Reads the sentinel and returns its stored wall clock in seconds, or 0
    /// when the sentinel is absent or unreadable.
    #[must_use]
    pub fn last_snapshot_timestamp(&self) -> i64 {
        match self.read_sentinel() {
            Ok(Some(timestamp)) => timestamp,
            Ok(None) => {
                debug!("snapshot sentinel not found");
                0
            }
            Err(err) => {
                warn!(error = %err, "failed to read the snapshot sentinel");
                0
            }
        }
    }

    fn read_sentinel(&self) -> Result<Option<i64>, CacheError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        let Some(guard) = table.get(SENTINEL_KEY)? else {
            return Ok(None);
        };
        let record: SnapshotRecord = serde_json::from_str(guard.value())?;
        Ok(Some(record.value.as_i64().unwrap_or(0)))
    }

    /// Commits any pending batch (refreshing the sentinel) in batched mode;
    /// a no-op in direct mode, where every mutation already committed.
    ///
    /// # Errors
    ///
    /// Surfaces commit failures; the batch is retained for retry.
    pub fn flush(&self) -> Result<(), CacheError> {
        match &self.batch {
            Some(batch) => flush_batch(&self.db, batch),
            None => Ok(()),
        }
    }

    /// Stops the background flusher and commits the pending batch.
    ///
    /// The underlying database closes when the handle is dropped.
    ///
    /// # Errors
    ///
    /// Surfaces the final commit failure.
    pub fn close(&self) -> Result<(), CacheError> {
        if let Some(shutdown) = &self.shutdown {
            let _ = shutdown.send(true);
        }
        self.flush()
    }
}

/// Applies `ops` in one transaction, refreshing the sentinel first so its
/// stored wall clock never exceeds the commit time.
fn commit_ops(db: &Database, ops: &[BatchOp]) -> Result<(), CacheError> {
    let sentinel = sentinel_blob()?;
    let txn = db.begin_write()?;
    {
        let mut table = txn.open_table(RECORDS)?;
        table.insert(SENTINEL_KEY, sentinel.as_str())?;
        for op in ops {
            match op {
                BatchOp::Put { key, blob } => {
                    table.insert(key.as_str(), blob.as_str())?;
                }
                BatchOp::Delete { key } => {
                    table.remove(key.as_str())?;
                }
            }
        }
    }
    txn.commit()?;
    Ok(())
}

/// The sentinel's own snapshot record: current wall clock, no expiry.
fn sentinel_blob() -> Result<String, CacheError> {
    let record = SnapshotRecord {
        value: Value::from(unix_now()),
        expired_at: 0,
    };
    Ok(serde_json::to_string(&record)?)
}

/// Drains the batch and commits it; on failure the drained mutations are
/// put back in front of anything enqueued meanwhile, so nothing is dropped.
fn flush_batch(db: &Database, batch: &Mutex<Vec<BatchOp>>) -> Result<(), CacheError> {
    let ops = std::mem::take(&mut *batch.lock());
    match commit_ops(db, &ops) {
        Ok(()) => Ok(()),
        Err(err) => {
            let mut guard = batch.lock();
            let newer = std::mem::take(&mut *guard);
            *guard = ops;
            guard.extend(newer);
            Err(err)
        }
    }
}

/// Background flusher for batched mode.
///
/// Holds only a weak handle to the database so a dropped store releases the
/// file lock even if the task has not yet observed the shutdown signal.
fn spawn_flusher(
    db: Weak<Database>,
    batch: Arc<Mutex<Vec<BatchOp>>>,
    period_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let period = Duration::from_secs(period_seconds);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(db) = db.upgrade() else { break };
                    if let Err(err) = flush_batch(&db, &batch) {
                        error!(error = %err, "periodic snapshot flush failed; batch kept for retry");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(blob: &str) -> SnapshotRecord {
        serde_json::from_str(blob).unwrap()
    }

    #[test]
    fn direct_mode_commits_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 0).unwrap();

        store.set("a", &json!(1), 0).unwrap();

        let entries = store.snapshot_iter().unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"a"));
        assert!(keys.contains(&SENTINEL_KEY));

        let (_, blob) = entries.iter().find(|(k, _)| k == "a").unwrap();
        let record = decode(blob);
        assert_eq!(record.value, json!(1));
        assert_eq!(record.expired_at, 0);
    }

    #[test]
    fn direct_mode_delete_removes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 0).unwrap();

        store.set("a", &json!("x"), 0).unwrap();
        store.delete("a").unwrap();

        let entries = store.snapshot_iter().unwrap();
        assert!(entries.iter().all(|(k, _)| k != "a"));
    }

    #[test]
    fn set_with_ttl_stores_absolute_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 0).unwrap();

        store.set("b", &json!("x"), 60).unwrap();

        let entries = store.snapshot_iter().unwrap();
        let (_, blob) = entries.iter().find(|(k, _)| k == "b").unwrap();
        let record = decode(blob);
        let expected = unix_now() + 60;
        assert!((record.expired_at - expected).abs() <= 1);
    }

    #[test]
    fn sentinel_absent_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 0).unwrap();
        assert_eq!(store.last_snapshot_timestamp(), 0);
    }

    #[test]
    fn sentinel_tracks_direct_writes_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 0).unwrap();

        store.set("a", &json!(1), 0).unwrap();
        let first = store.last_snapshot_timestamp();
        assert!(first > 0);

        store.set("b", &json!(2), 0).unwrap();
        let second = store.last_snapshot_timestamp();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn batched_mode_holds_mutations_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        // A period long enough that the ticker never fires during the test.
        let store = SnapshotStore::open(dir.path(), 3600).unwrap();

        store.set("a", &json!(1), 0).unwrap();
        assert!(store.snapshot_iter().unwrap().is_empty());
        assert_eq!(store.last_snapshot_timestamp(), 0);

        store.flush().unwrap();

        let entries = store.snapshot_iter().unwrap();
        assert!(entries.iter().any(|(k, _)| k == "a"));
        assert!(store.last_snapshot_timestamp() > 0);
    }

    #[tokio::test]
    async fn batched_flush_applies_ops_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 3600).unwrap();

        store.set("k", &json!("first"), 0).unwrap();
        store.set("k", &json!("second"), 0).unwrap();
        store.delete("gone").unwrap();
        store.flush().unwrap();

        let entries = store.snapshot_iter().unwrap();
        let (_, blob) = entries.iter().find(|(k, _)| k == "k").unwrap();
        assert_eq!(decode(blob).value, json!("second"));
    }

    #[tokio::test]
    async fn background_flusher_commits_on_its_own() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 1).unwrap();

        store.set("a", &json!(1), 0).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(store.snapshot_iter().unwrap().iter().any(|(k, _)| k == "a"));
    }

    #[tokio::test]
    async fn close_flushes_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SnapshotStore::open(dir.path(), 3600).unwrap();
            store.set("persisted", &json!({"n": 7}), 0).unwrap();
            store.close().unwrap();
        }
        // The dropped handle released the file lock; reopen in direct mode.
        let store = SnapshotStore::open(dir.path(), 0).unwrap();
        let entries = store.snapshot_iter().unwrap();
        let (_, blob) = entries.iter().find(|(k, _)| k == "persisted").unwrap();
        assert_eq!(decode(blob).value, json!({"n": 7}));
        assert!(store.last_snapshot_timestamp() > 0);
    }
}
