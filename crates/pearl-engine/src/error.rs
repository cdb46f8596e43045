//! The domain error taxonomy surfaced to the gateway.

use pearl_net::NetError;
use pearl_store::StoreError;

/// Errors returned by the [`Node`](crate::Node) facade.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Put on a key-hash that already has a record. Client-recoverable.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// The key-hash collides with a reserved prefix. Client-recoverable.
    #[error("invalid key: reserved prefix")]
    InvalidKey,

    /// Get on an invalidated record.
    #[error("access invalidated: {reason}")]
    Invalidated {
        /// Reason given when the record was invalidated.
        reason: String,
    },

    /// The node is shutting down.
    #[error("operation cancelled")]
    Cancelled,

    /// Retriable storage or network fault.
    #[error("transient fault: {0}")]
    Transient(String),

    /// Everything else; reported to the operator, opaque to clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for NodeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::KeyAlreadyExists => Self::KeyAlreadyExists,
            StoreError::InvalidKey => Self::InvalidKey,
            StoreError::Invalidated { reason } => Self::Invalidated { reason },
            StoreError::Io(io) => Self::Transient(io.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<NetError> for NodeError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::Certificate(msg) => Self::Internal(format!("certificate error: {msg}")),
            other => Self::Transient(other.to_string()),
        }
    }
}
