//! Protocol messages for the Pearl RPC layer.
//!
//! All messages are postcard-serialized, length-prefixed frames over mTLS.

use pearl_types::{KeyHash, NodeId, Record};
use serde::{Deserialize, Serialize};

/// One requested high-water mark: "send me everything `node_id` authored
/// past `clock`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEntry {
    /// Authoring node whose log is requested.
    pub node_id: NodeId,
    /// The caller's high-water clock for that node.
    pub clock: u64,
}

/// Pull request: the caller's view of every known node's clock, the serving
/// peer's own id included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRequest {
    /// Requested `(node, high-water)` pairs, iterated in order by the peer.
    pub entries: Vec<ClockEntry>,
}

/// One streamed record: the log entry's author plus the current record row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEntry {
    /// Node that authored the underlying log entry.
    pub node_id: NodeId,
    /// Key-hash of the record.
    pub key_hash: KeyHash,
    /// The record as currently stored on the serving node.
    pub record: Record,
}

/// Pull response: up to the serving node's replication limit of entries,
/// ordered by `(node_id, clock)` within each requested node, in request
/// order across nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationResponse {
    /// Streamed entries; empty when the caller is already caught up.
    pub entries: Vec<ReplicationEntry>,
}

/// Protocol messages exchanged between Pearl nodes.
///
/// One request frame is answered by exactly one response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMessage {
    /// Liveness and identity probe.
    PingRequest,

    /// Response to [`NodeMessage::PingRequest`].
    PingResponse {
        /// The serving node's id, cross-checked against the peer catalog.
        node_id: NodeId,
    },

    /// Pull replication request.
    Replicate(ReplicationRequest),

    /// Response to [`NodeMessage::Replicate`].
    ReplicateOk(ReplicationResponse),

    /// The request failed on the serving node; callers treat this as
    /// retriable on the next sync cycle.
    Error {
        /// Operator-facing description of the failure.
        message: String,
    },
}
