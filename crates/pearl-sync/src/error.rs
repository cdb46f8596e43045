//! Error types for replication.

use pearl_net::NetError;
use pearl_store::StoreError;
use pearl_types::NodeId;

/// Errors that abort one peer's sync cycle. Never fatal: the next cycle
/// retries from the unchanged high-water marks.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Dial, handshake, or request failure.
    #[error("network error: {0}")]
    Net(#[from] NetError),

    /// Local store failure while building a request or ingesting a response.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The peer at a configured address reported a different node id.
    #[error("peer identity mismatch: expected {expected}, got {reported}")]
    IdentityMismatch {
        /// Node id the catalog lists for the address.
        expected: NodeId,
        /// Node id the peer reported over the authenticated channel.
        reported: NodeId,
    },
}
