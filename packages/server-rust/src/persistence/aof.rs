//! Append-only operation log: rotating line writer plus replay reader.
//!
//! Every user-originated mutation appends up to two lines (`pending`, then
//! `completed` or `failed`) in the grammar defined by
//! [`cacher_core::aof`]. The sink rotates the active file by size, keeps a
//! bounded number of `aof.log.N` backups, and ages old backups out; a
//! rotation happens between appends, so a line is never torn.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use cacher_core::{parse_line, render_delete, render_set, unix_now, Command, OpState};

use crate::error::CacheError;

/// Size, count, and age bounds for the rotating sink.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    /// Rotate once the active file would exceed this many bytes.
    pub max_size_bytes: u64,
    /// Number of rotated `aof.log.N` siblings to keep.
    pub max_backups: usize,
    /// Backups older than this many days are deleted at rotation time.
    pub max_age_days: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 500 * 1024 * 1024,
            max_backups: 10,
            max_age_days: 30,
        }
    }
}

#[derive(Debug)]
struct ActiveFile {
    file: File,
    size: u64,
}

/// The append-only log sink. Appends are serialized by an internal lock.
#[derive(Debug)]
pub struct AofSink {
    path: PathBuf,
    policy: RotationPolicy,
    active: Mutex<ActiveFile>,
}

/// Commands recovered by [`AofSink::replay`], plus the number of malformed
/// lines that were skipped along the way.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    /// Pending commands in file order.
    pub commands: Vec<Command>,
    /// Malformed lines encountered and skipped.
    pub skipped: usize,
}

impl AofSink {
    /// Opens (or creates) the log at `path` with the default rotation policy.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory or the file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::with_policy(path, RotationPolicy::default())
    }

    /// Opens the log with an explicit rotation policy.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory or the file cannot be created.
    pub fn with_policy(
        path: impl Into<PathBuf>,
        policy: RotationPolicy,
    ) -> Result<Self, CacheError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            policy,
            active: Mutex::new(ActiveFile { file, size }),
        })
    }

    /// Appends one `set` line in the given state.
    ///
    /// # Errors
    ///
    /// Surfaces file I/O failures.
    pub fn write_set(
        &self,
        key: &str,
        encoded_value: &str,
        ttl_seconds: i64,
        state: OpState,
    ) -> Result<(), CacheError> {
        self.append(&render_set(unix_now(), key, encoded_value, ttl_seconds, state))
    }

    /// Appends one `delete` line in the given state.
    ///
    /// # Errors
    ///
    /// Surfaces file I/O failures.
    pub fn write_delete(&self, key: &str, state: OpState) -> Result<(), CacheError> {
        self.append(&render_delete(unix_now(), key, state))
    }

    // A line plus its newline always lands in a single file: rotation runs
    // under the same lock, before the write.
    fn append(&self, line: &str) -> Result<(), CacheError> {
        let mut active = self.active.lock();
        // usize fits in u64 on supported targets.
        #[allow(clippy::cast_possible_truncation)]
        let needed = (line.len() + 1) as u64;
        if active.size > 0 && active.size + needed > self.policy.max_size_bytes {
            self.rotate(&mut active)?;
        }
        active.file.write_all(line.as_bytes())?;
        active.file.write_all(b"\n")?;
        active.size += needed;
        Ok(())
    }

    fn rotate(&self, active: &mut ActiveFile) -> Result<(), CacheError> {
        // Shift aof.log.N up towards the retention cap; the oldest falls off.
        let oldest = self.backup_path(self.policy.max_backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.policy.max_backups).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                fs::rename(&from, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;
        active.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        active.size = 0;
        self.prune_aged_backups();
        Ok(())
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn prune_aged_backups(&self) {
        let horizon = Duration::from_secs(self.policy.max_age_days * 24 * 60 * 60);
        for index in 1..=self.policy.max_backups {
            let path = self.backup_path(index);
            let Ok(meta) = fs::metadata(&path) else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if modified.elapsed().is_ok_and(|age| age > horizon) {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %err, "failed to age out rotated log file");
                }
            }
        }
    }

    /// Scans the active log file and returns, in file order, every `pending`
    /// command whose timestamp is at or after `from_ts` (all of them when
    /// `from_ts` is 0). Malformed lines are skipped and counted.
    ///
    /// Only `pending` entries are replayed: a terminal `completed` entry is
    /// assumed captured by a snapshot flush at or after its timestamp, while
    /// a mutation that never reached its terminal line has an unknown fate.
    ///
    /// # Errors
    ///
    /// Surfaces read failures; a missing file replays as empty.
    pub fn replay(&self, from_ts: i64) -> Result<ReplayOutcome, CacheError> {
        if from_ts == 0 {
            info!("AOF: restoring all records");
        } else {
            info!("AOF: restoring from timestamp {from_ts}");
        }

        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ReplayOutcome::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut outcome = ReplayOutcome::default();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok(entry) => {
                    if from_ts != 0 && entry.timestamp < from_ts {
                        continue;
                    }
                    if entry.state == OpState::Pending {
                        outcome.commands.push(entry.command);
                    }
                }
                Err(err) => {
                    outcome.skipped += 1;
                    warn!(error = %err, "skipping malformed log line");
                }
            }
        }
        Ok(outcome)
    }
}
