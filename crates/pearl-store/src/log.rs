//! Replication-log entries and their value encoding.

use pearl_types::{KeyHash, NodeId, RecordState};

use crate::StoreError;

/// One state transition of a record on its authoring node.
///
/// Entries are ordered by `(node_id, clock)`; the clock is dense on the
/// authoring node, so peers can pull everything past a known high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplicationLogEntry {
    /// Node that authored the transition.
    pub node_id: NodeId,
    /// Authoring node's clock at the transition.
    pub clock: u64,
    /// Record the transition belongs to.
    pub key_hash: KeyHash,
    /// State the record reached.
    pub state: RecordState,
}

/// Encode a log value: 1 state byte + 8-byte big-endian TTL (0 = none).
///
/// The TTL travels with the entry so garbage collection can reclaim log
/// entries without resolving their record rows.
pub fn encode_log_value(state: RecordState, ttl: Option<u64>) -> [u8; 9] {
    let mut value = [0u8; 9];
    value[0] = state.as_u8();
    value[1..].copy_from_slice(&ttl.unwrap_or(0).to_be_bytes());
    value
}

/// Decode a log value into its state and TTL.
pub fn decode_log_value(value: &[u8]) -> Result<(RecordState, Option<u64>), StoreError> {
    if value.len() != 9 {
        return Err(StoreError::CorruptData(format!(
            "log value expected 9 bytes, got {}",
            value.len()
        )));
    }
    let state = RecordState::from_u8(value[0]).ok_or_else(|| {
        StoreError::CorruptData(format!("unknown record state byte {}", value[0]))
    })?;
    let ttl = u64::from_be_bytes(value[1..].try_into().expect("length checked"));
    Ok((state, (ttl != 0).then_some(ttl)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_value_roundtrip() {
        for (state, ttl) in [
            (RecordState::Created, None),
            (RecordState::Invalidated, Some(1_700_000_000)),
            (RecordState::Deleted, Some(u64::MAX)),
        ] {
            let value = encode_log_value(state, ttl);
            assert_eq!(decode_log_value(&value).unwrap(), (state, ttl));
        }
    }

    #[test]
    fn test_log_value_rejects_garbage() {
        assert!(decode_log_value(&[0u8; 3]).is_err());
        let mut bad_state = encode_log_value(RecordState::Created, None);
        bad_state[0] = 9;
        assert!(decode_log_value(&bad_state).is_err());
    }
}
