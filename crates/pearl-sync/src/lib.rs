//! Pull replication between Pearl nodes.
//!
//! Each node runs one [`Replicator`] task that periodically asks every
//! configured peer for log entries past this node's high-water marks and
//! ingests the answers. The serving side is [`ReplicationService`], the
//! [`RpcHandler`](pearl_net::RpcHandler) implementation behind the node's
//! RPC listener; its selection logic lives in [`build_replication_response`].

mod error;
mod handler;
mod replicator;

#[cfg(test)]
mod tests;

pub use error::SyncError;
pub use handler::{build_replication_response, ReplicationService};
pub use replicator::{Replicator, ReplicatorHandle};
