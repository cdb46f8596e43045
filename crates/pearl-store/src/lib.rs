//! Embedded credential store wrapping Fjall.
//!
//! [`AccessStore`] keeps three key spaces in one ordered keyspace:
//!
//! - record rows — raw 32-byte [`KeyHash`](pearl_types::KeyHash) keys
//! - replication log — `"!log!" <nodeid> <clock:be64> <keyhash>` keys
//! - node clocks — `"!clock!" <nodeid>` keys, one row for the local node's
//!   own monotonic clock and one per peer for the observed high-water
//!
//! Every mutating operation commits a single atomic batch that writes the
//! record row, appends the matching replication-log entry, and persists the
//! advanced clock. Tombstones and expired records are reclaimed by
//! [`AccessStore::collect_garbage`].

mod error;
mod keys;
mod log;
mod store;

pub use error::StoreError;
pub use log::ReplicationLogEntry;
pub use store::{AccessStore, GcStats};
