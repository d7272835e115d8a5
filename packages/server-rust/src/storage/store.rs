//! Record-level layer above the [`StorageEngine`].
//!
//! [`MemoryStore`] owns the semantics the engines are agnostic to: encoding
//! values to their JSON text form, converting a relative ttl into an
//! absolute expiry on the way in, and the lazy-expiry check plus decode on
//! the way out.

use serde_json::Value;

use cacher_core::{expiry_from_ttl, is_expired, unix_now, Record};

use crate::error::CacheError;
use crate::storage::engine::StorageEngine;

/// The in-memory store: an engine plus record semantics.
#[derive(Debug)]
pub struct MemoryStore {
    engine: Box<dyn StorageEngine>,
}

impl MemoryStore {
    /// Wraps the given engine.
    #[must_use]
    pub fn new(engine: Box<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    /// Encodes `value` and stores it under `key` with a relative ttl.
    ///
    /// A ttl of 0 means the record never expires.
    ///
    /// # Errors
    ///
    /// Fails only if the value cannot be encoded.
    pub fn set(&self, key: &str, value: &Value, ttl_seconds: i64) -> Result<(), CacheError> {
        self.set_at(key, value, expiry_from_ttl(unix_now(), ttl_seconds))
    }

    /// Encodes `value` and stores it under `key` with an absolute expiry.
    ///
    /// Restore paths use this to reinsert snapshot records without running
    /// them back through the relative-ttl conversion.
    ///
    /// # Errors
    ///
    /// Fails only if the value cannot be encoded.
    pub fn set_at(&self, key: &str, value: &Value, expired_at: i64) -> Result<(), CacheError> {
        let record = Record::encode(value, expired_at)?;
        self.engine.put(key, record);
        Ok(())
    }

    /// Looks up `key`, returning the decoded value and its absolute expiry.
    ///
    /// An absent record and a record whose expiry has passed both come back
    /// as `None`; the expired record is left in place for a later writer to
    /// overwrite (lazy expiry).
    ///
    /// # Errors
    ///
    /// Fails if the stored text no longer decodes as JSON.
    pub fn get(&self, key: &str) -> Result<Option<(Value, i64)>, CacheError> {
        let Some(record) = self.engine.get(key) else {
            return Ok(None);
        };
        if is_expired(record.expired_at, unix_now()) {
            return Ok(None);
        }
        let value = record.decode()?;
        Ok(Some((value, record.expired_at)))
    }

    /// Removes any record under `key`. Absence is not an error.
    pub fn delete(&self, key: &str) {
        self.engine.remove(key);
    }

    /// Every stored key, expired-but-unobserved ones included.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.engine.keys()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }
}
