//! Domain errors for the cache manager and its durability core.

/// Errors surfaced by the cache manager and the stores it composes.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An unknown `cache_type` was requested. Fatal at init.
    #[error("Cache Provider '{0}' is invalid.")]
    InvalidProvider(String),

    /// A value could not be encoded to (or decoded from) its JSON text form.
    #[error("value encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The embedded snapshot store reported a read/write failure.
    #[error("snapshot store failure: {0}")]
    Snapshot(#[from] redb::Error),

    /// File I/O on the append-only log failed.
    #[error("append-only log I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

// redb reports each phase of a transaction with its own error type; funnel
// them all through the unified `redb::Error` so `?` works at call sites.
impl From<redb::DatabaseError> for CacheError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Snapshot(err.into())
    }
}

impl From<redb::TransactionError> for CacheError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Snapshot(err.into())
    }
}

impl From<redb::TableError> for CacheError {
    fn from(err: redb::TableError) -> Self {
        Self::Snapshot(err.into())
    }
}

impl From<redb::StorageError> for CacheError {
    fn from(err: redb::StorageError) -> Self {
        Self::Snapshot(err.into())
    }
}

impl From<redb::CommitError> for CacheError {
    fn from(err: redb::CommitError) -> Self {
        Self::Snapshot(err.into())
    }
}
