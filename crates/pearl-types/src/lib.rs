//! Shared types and identifiers for Pearl.
//!
//! This crate defines the core types used across the Pearl workspace:
//! identifiers ([`KeyHash`], [`NodeId`]), the credential [`Record`] with its
//! [`RecordState`] lifecycle, and the gateway-facing [`RecordPayload`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte that introduces every internal key space (`!log!`, `!clock!`).
///
/// A user [`KeyHash`] must never start with this byte, otherwise record keys
/// and internal keys would become ambiguous in the shared ordered keyspace.
pub const RESERVED_TAG_BYTE: u8 = b'!';

// ---------------------------------------------------------------------------
// KeyHash
// ---------------------------------------------------------------------------

/// Opaque 32-byte credential identifier presented by gateway clients.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct KeyHash([u8; 32]);

impl KeyHash {
    /// Derive a key-hash from arbitrary data with BLAKE3.
    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this key-hash collides with the reserved internal key spaces.
    pub fn has_reserved_prefix(&self) -> bool {
        self.0[0] == RESERVED_TAG_BYTE
    }
}

impl From<[u8; 32]> for KeyHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for KeyHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({self})")
    }
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identifier of a cluster member.
///
/// Fixed 32 bytes on disk and on the wire. Operators configure short ASCII
/// names ("node-a"); these are zero-padded to 32 bytes. [`fmt::Display`]
/// renders the trimmed name when it is printable ASCII, hex otherwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Build a node id from a configured name of at most 32 bytes.
    ///
    /// Returns `None` when the name is empty or too long.
    pub fn from_name(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 32 {
            return None;
        }
        let mut id = [0u8; 32];
        id[..bytes.len()].copy_from_slice(bytes);
        Some(Self(id))
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn printable_name(&self) -> Option<&str> {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.0.len());
        if self.0[end..].iter().any(|&b| b != 0) {
            return None;
        }
        let name = std::str::from_utf8(&self.0[..end]).ok()?;
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_graphic()) {
            Some(name)
        } else {
            None
        }
    }
}

impl From<[u8; 32]> for NodeId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.printable_name() {
            Some(name) => f.write_str(name),
            None => {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

// ---------------------------------------------------------------------------
// Record state
// ---------------------------------------------------------------------------

/// Lifecycle state of a credential record.
///
/// Transitions are monotonic along `Created → Invalidated → Deleted`; the
/// derived [`Ord`] makes the replication merge a plain `max`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum RecordState {
    /// Live record, resolvable by the gateway.
    Created = 0,
    /// Access withdrawn; lookups report the invalidation reason.
    Invalidated = 1,
    /// Tombstoned; lookups report the record as missing.
    Deleted = 2,
}

impl RecordState {
    /// Single-byte encoding used in replication-log values.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode from the single-byte log encoding.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Created),
            1 => Some(Self::Invalidated),
            2 => Some(Self::Deleted),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Gateway-supplied credential payload accepted by Put.
///
/// These fields are immutable once the record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Address of the satellite this credential is scoped to.
    pub satellite_address: String,
    /// Head of the macaroon embedded in the access grant.
    pub macaroon_head: Vec<u8>,
    /// Secret key, encrypted with the client's key-encryption key.
    pub encrypted_secret_key: Vec<u8>,
    /// Serialized access grant, encrypted the same way.
    pub encrypted_access_grant: Vec<u8>,
    /// Whether the credential may be used for public (link-shared) access.
    pub public: bool,
    /// Absolute expiration in unix seconds, `None` for non-expiring records.
    pub expires_at: Option<u64>,
}

/// A stored credential record: payload plus authoring metadata and state.
///
/// `node_id` is fixed at creation; `clock` tracks the authoring node's
/// logical clock value of the latest state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Node that created this record.
    pub node_id: NodeId,
    /// Authoring node's clock at the latest transition.
    pub clock: u64,
    /// Creation time, unix seconds.
    pub created_at: u64,
    /// Current lifecycle state.
    pub state: RecordState,
    /// Address of the satellite this credential is scoped to.
    pub satellite_address: String,
    /// Head of the macaroon embedded in the access grant.
    pub macaroon_head: Vec<u8>,
    /// Secret key, encrypted with the client's key-encryption key.
    pub encrypted_secret_key: Vec<u8>,
    /// Serialized access grant, encrypted the same way.
    pub encrypted_access_grant: Vec<u8>,
    /// Whether the credential may be used for public (link-shared) access.
    pub public: bool,
    /// Absolute expiration in unix seconds, `None` for non-expiring records.
    pub expires_at: Option<u64>,
    /// Reason for invalidation, if any.
    pub invalidation_reason: Option<String>,
    /// When the record was invalidated, unix seconds.
    pub invalidated_at: Option<u64>,
    /// When the record was deleted, unix seconds.
    pub tombstoned_at: Option<u64>,
}

impl Record {
    /// Whether the record's expiration has passed at `now` (unix seconds).
    ///
    /// The boundary is strict: a record is still live at exactly
    /// `expires_at` and expired one second later.
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }

    /// The gateway-facing payload view of this record.
    pub fn payload(&self) -> RecordPayload {
        RecordPayload {
            satellite_address: self.satellite_address.clone(),
            macaroon_head: self.macaroon_head.clone(),
            encrypted_secret_key: self.encrypted_secret_key.clone(),
            encrypted_access_grant: self.encrypted_access_grant.clone(),
            public: self.public,
            expires_at: self.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
