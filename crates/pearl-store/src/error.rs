//! Error types for the credential store.

/// Errors returned by [`AccessStore`](crate::AccessStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Put on a key-hash that already has a record (tombstones included).
    #[error("key already exists")]
    KeyAlreadyExists,

    /// The key-hash collides with a reserved internal key space.
    #[error("invalid key: reserved prefix")]
    InvalidKey,

    /// Get on an invalidated record; carries the recorded reason.
    #[error("access invalidated: {reason}")]
    Invalidated {
        /// Reason given when the record was invalidated.
        reason: String,
    },

    /// Fjall database error.
    #[error("fjall error: {0}")]
    Backend(#[from] fjall::Error),

    /// I/O error (e.g. from Fjall guard operations).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] postcard::Error),

    /// A stored key or value did not decode as expected.
    #[error("corrupt data: {0}")]
    CorruptData(String),
}
