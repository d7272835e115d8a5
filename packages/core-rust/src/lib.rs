//! Cacher core -- cache records, TTL arithmetic, and the AOF line grammar.
//!
//! This crate is the pure foundation layer for the cacher server:
//!
//! - **Records** ([`record`]): [`Record`], [`SnapshotRecord`], expiry helpers
//! - **AOF grammar** ([`aof`]): rendering and parsing of append-only log lines
//!
//! It performs no I/O; the server crate owns files, sockets, and the on-disk
//! snapshot store.

pub mod aof;
pub mod record;

// Records
pub use record::{expiry_from_ttl, is_expired, unix_now, Record, SnapshotRecord, SENTINEL_KEY};

// AOF grammar
pub use aof::{parse_line, render_delete, render_set, Command, Entry, OpState, ParseError};
