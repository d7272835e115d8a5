//! Durability for the cache: snapshot store, operation log, and the
//! startup restore that composes the two.
//!
//! - [`cdb`]: periodic (or direct) full-state snapshots on an embedded
//!   ordered on-disk store
//! - [`aof`]: an append-only, line-oriented log of mutation intent
//! - [`restore`]: replays snapshot-then-log into the in-memory store

pub mod aof;
pub mod cdb;
pub mod restore;

pub use aof::{AofSink, ReplayOutcome, RotationPolicy};
pub use cdb::SnapshotStore;
pub use restore::{restore_from_aof, restore_from_cdb};
