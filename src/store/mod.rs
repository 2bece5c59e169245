//! Durable mirror of the in-memory chat cache.
//!
//! The event layer mutates the cache; a background timer flushes it to a
//! single JSON file and it is reloaded once at startup.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotStore};
