//! Cache record types and TTL arithmetic.
//!
//! A key maps to at most one live [`Record`]. The in-memory store keeps the
//! value in its JSON text encoding so no runtime type information is carried;
//! the snapshot store persists the decoded form as a [`SnapshotRecord`]. Both
//! share the same expiry rule: a relative ttl of 0 means "never", anything
//! else becomes an absolute unix-seconds timestamp.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved snapshot-store key whose record carries the wall-clock timestamp
/// of the most recent flush in its `value` field.
pub const SENTINEL_KEY: &str = "--updated_at_timestamp--";

/// Returns the current wall clock as whole seconds since the Unix epoch.
///
/// Second granularity matches the AOF timestamp resolution.
#[must_use]
pub fn unix_now() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
}

/// Converts a relative ttl into an absolute expiry timestamp.
///
/// A ttl of 0 (or less) means the record never expires and maps to 0.
#[must_use]
pub fn expiry_from_ttl(now: i64, ttl_seconds: i64) -> i64 {
    if ttl_seconds <= 0 {
        0
    } else {
        now.saturating_add(ttl_seconds)
    }
}

/// Whether a record with the given absolute expiry must be treated as absent
/// at `now`. An expiry of 0 never expires.
#[must_use]
pub fn is_expired(expired_at: i64, now: i64) -> bool {
    expired_at > 0 && now >= expired_at
}

/// A record as held by the in-memory store: the JSON text encoding of the
/// value plus its absolute expiry (0 = never).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// JSON text encoding of the cached value.
    pub value: String,
    /// Absolute unix-seconds expiry; 0 means the record never expires.
    pub expired_at: i64,
}

impl Record {
    /// Encodes `value` under the given absolute expiry.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the value cannot be encoded.
    pub fn encode(value: &Value, expired_at: i64) -> serde_json::Result<Self> {
        Ok(Self {
            value: serde_json::to_string(value)?,
            expired_at,
        })
    }

    /// Decodes the stored JSON text back into a value.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error if the stored text is not valid JSON.
    pub fn decode(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.value)
    }
}

/// The on-disk snapshot form of a record: the decoded value plus its absolute
/// expiry. Serialized as a self-describing JSON blob under the user-facing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// The decoded value: any JSON primitive, sequence, or string-keyed mapping.
    pub value: Value,
    /// Absolute unix-seconds expiry; 0 means the record never expires.
    pub expired_at: i64,
}

impl SnapshotRecord {
    /// Composes a snapshot record from a value and a relative ttl.
    #[must_use]
    pub fn new(value: Value, ttl_seconds: i64) -> Self {
        Self {
            value,
            expired_at: expiry_from_ttl(unix_now(), ttl_seconds),
        }
    }
}
