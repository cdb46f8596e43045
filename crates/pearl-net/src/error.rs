//! Error types for network operations.

/// Errors that can occur during node-to-node RPC.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Certificate material could not be loaded or was rejected.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Failed to reach or handshake with a remote node.
    #[error("connection error: {0}")]
    Connect(String),

    /// I/O error on an established connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The remote node answered with an error frame.
    #[error("remote error: {0}")]
    Remote(String),

    /// The remote node answered with a message of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A dial or request exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}
