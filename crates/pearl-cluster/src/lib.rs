//! Cluster membership for Pearl.
//!
//! Membership is static: the operator configures the full `NodeId → address`
//! map and nothing mutates it after start. [`PeerCatalog`] is that immutable
//! view; [`PeerTracker`] records per-peer sync outcomes for observability and
//! tests. Replication never blacklists a peer based on status.

mod catalog;
mod status;

pub use catalog::{PeerCatalog, PeerEntry};
pub use status::{PeerStatus, PeerTracker};
