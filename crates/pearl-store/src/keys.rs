//! Binary layout of the three key spaces sharing one ordered keyspace.
//!
//! Record rows use the raw 32-byte key-hash. Internal rows are introduced by
//! an ASCII tag starting with `!`, which is why user key-hashes beginning
//! with that byte are rejected at the API boundary. Clocks are big-endian so
//! lexicographic order equals numeric order and a log scan for
//! `(node, > clock)` is a plain bounded range.

use pearl_types::{KeyHash, NodeId};

/// Tag introducing replication-log keys.
pub const LOG_TAG: &[u8] = b"!log!";

/// Tag introducing node-clock keys.
pub const CLOCK_TAG: &[u8] = b"!clock!";

const LOG_KEY_LEN: usize = LOG_TAG.len() + 32 + 8 + 32;
const CLOCK_KEY_LEN: usize = CLOCK_TAG.len() + 32;

/// Key of a replication-log entry: `"!log!" <nodeid> <clock:be64> <keyhash>`.
pub fn log_key(node_id: &NodeId, clock: u64, key_hash: &KeyHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(LOG_KEY_LEN);
    key.extend_from_slice(LOG_TAG);
    key.extend_from_slice(node_id.as_bytes());
    key.extend_from_slice(&clock.to_be_bytes());
    key.extend_from_slice(key_hash.as_bytes());
    key
}

/// Decompose a replication-log key into (node, clock, key-hash).
pub fn parse_log_key(key: &[u8]) -> Option<(NodeId, u64, KeyHash)> {
    if key.len() != LOG_KEY_LEN || !key.starts_with(LOG_TAG) {
        return None;
    }
    let rest = &key[LOG_TAG.len()..];
    let node_id = NodeId::from(<[u8; 32]>::try_from(&rest[..32]).ok()?);
    let clock = u64::from_be_bytes(rest[32..40].try_into().ok()?);
    let key_hash = KeyHash::from(<[u8; 32]>::try_from(&rest[40..]).ok()?);
    Some((node_id, clock, key_hash))
}

/// Key of a node-clock row: `"!clock!" <nodeid>`.
pub fn clock_key(node_id: &NodeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(CLOCK_KEY_LEN);
    key.extend_from_slice(CLOCK_TAG);
    key.extend_from_slice(node_id.as_bytes());
    key
}

/// Extract the node id from a node-clock key.
pub fn parse_clock_key(key: &[u8]) -> Option<NodeId> {
    if key.len() != CLOCK_KEY_LEN || !key.starts_with(CLOCK_TAG) {
        return None;
    }
    let bytes = <[u8; 32]>::try_from(&key[CLOCK_TAG.len()..]).ok()?;
    Some(NodeId::from(bytes))
}

/// Inclusive key range covering log entries of `node_id` with clock strictly
/// greater than `after`.
///
/// Returns `None` when no greater clock can exist.
pub fn log_scan_bounds(node_id: &NodeId, after: u64) -> Option<(Vec<u8>, Vec<u8>)> {
    let first = after.checked_add(1)?;

    let mut start = Vec::with_capacity(LOG_KEY_LEN);
    start.extend_from_slice(LOG_TAG);
    start.extend_from_slice(node_id.as_bytes());
    start.extend_from_slice(&first.to_be_bytes());
    start.extend_from_slice(&[0u8; 32]);

    let mut end = Vec::with_capacity(LOG_KEY_LEN);
    end.extend_from_slice(LOG_TAG);
    end.extend_from_slice(node_id.as_bytes());
    end.extend_from_slice(&[0xff; 8 + 32]);

    Some((start, end))
}
