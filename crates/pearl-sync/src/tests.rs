//! Tests for response selection and the RPC service.

use std::sync::Arc;
use std::time::Duration;

use pearl_net::{ClockEntry, NodeMessage, ReplicationRequest, RpcHandler};
use pearl_store::AccessStore;
use pearl_types::{KeyHash, NodeId, Record, RecordPayload, RecordState};

use crate::handler::{build_replication_response, ReplicationService};

const HOUR: Duration = Duration::from_secs(3600);
const NOW: u64 = 1_700_000_000;

fn node(name: &str) -> NodeId {
    NodeId::from_name(name).unwrap()
}

fn kh(author: &str, clock: u64) -> KeyHash {
    KeyHash::from_data(format!("{author}-{clock}").as_bytes())
}

fn payload() -> RecordPayload {
    RecordPayload {
        satellite_address: "sat.example.test:7777".to_string(),
        macaroon_head: b"head".to_vec(),
        encrypted_secret_key: b"secret".to_vec(),
        encrypted_access_grant: b"grant".to_vec(),
        public: false,
        expires_at: None,
    }
}

fn peer_record(author: &str, clock: u64) -> Record {
    Record {
        node_id: node(author),
        clock,
        created_at: NOW,
        state: RecordState::Created,
        satellite_address: "sat.example.test:7777".to_string(),
        macaroon_head: b"head".to_vec(),
        encrypted_secret_key: b"secret".to_vec(),
        encrypted_access_grant: b"grant".to_vec(),
        public: false,
        expires_at: None,
        invalidation_reason: None,
        invalidated_at: None,
        tombstoned_at: None,
    }
}

/// A store with log entries from four authors:
/// self (`node-a`) at clocks 1..=50, `node-b` at 50, `node-c` at 52..=99,
/// `node-d` at 100..=254.
fn multi_author_store() -> AccessStore {
    let store = AccessStore::open_temporary(node("node-a"), HOUR).unwrap();

    for clock in 1..=50u64 {
        store.put_at(&kh("node-a", clock), &payload(), NOW).unwrap();
    }
    store
        .insert_replicated(&kh("node-b", 50), &peer_record("node-b", 50))
        .unwrap();
    for clock in 52..=99u64 {
        store
            .insert_replicated(&kh("node-c", clock), &peer_record("node-c", clock))
            .unwrap();
    }
    for clock in 100..=254u64 {
        store
            .insert_replicated(&kh("node-d", clock), &peer_record("node-d", clock))
            .unwrap();
    }

    store
}

fn request(entries: &[(&str, u64)]) -> ReplicationRequest {
    ReplicationRequest {
        entries: entries
            .iter()
            .map(|&(name, clock)| ClockEntry {
                node_id: node(name),
                clock,
            })
            .collect(),
    }
}

#[test]
fn test_selection_small_limit_fills_from_first_entry() {
    let store = multi_author_store();
    let request = request(&[
        ("node-a", 25),
        ("node-c", 12),
        ("node-b", 0),
        ("node-d", 155),
        ("node-e", 10_000),
    ]);

    let response = build_replication_response(&store, &request, 25).unwrap();
    assert_eq!(response.entries.len(), 25);
    for (i, entry) in response.entries.iter().enumerate() {
        assert_eq!(entry.node_id, node("node-a"));
        assert_eq!(entry.record.clock, 26 + i as u64);
    }
}

#[test]
fn test_selection_large_limit_spans_authors_in_request_order() {
    let store = multi_author_store();
    let request = request(&[
        ("node-a", 25),
        ("node-c", 12),
        ("node-b", 0),
        ("node-d", 155),
        ("node-e", 10_000),
    ]);

    let response = build_replication_response(&store, &request, 100).unwrap();
    assert_eq!(response.entries.len(), 100);

    // node-a: clocks 26..=50.
    let a = &response.entries[..25];
    assert!(a.iter().all(|e| e.node_id == node("node-a")));
    assert_eq!(a.first().unwrap().record.clock, 26);
    assert_eq!(a.last().unwrap().record.clock, 50);

    // node-c: everything past 12 is its full log, 52..=99.
    let c = &response.entries[25..73];
    assert!(c.iter().all(|e| e.node_id == node("node-c")));
    assert_eq!(c.first().unwrap().record.clock, 52);
    assert_eq!(c.last().unwrap().record.clock, 99);

    // node-b: the single entry at 50.
    let b = &response.entries[73];
    assert_eq!(b.node_id, node("node-b"));
    assert_eq!(b.record.clock, 50);

    // node-d: the remaining capacity, 156..=181. node-e is unknown and
    // skipped silently.
    let d = &response.entries[74..];
    assert_eq!(d.len(), 26);
    assert!(d.iter().all(|e| e.node_id == node("node-d")));
    assert_eq!(d.first().unwrap().record.clock, 156);
    assert_eq!(d.last().unwrap().record.clock, 181);
}

#[test]
fn test_selection_caught_up_entries_yield_nothing() {
    let store = multi_author_store();

    let response =
        build_replication_response(&store, &request(&[("node-a", 50)]), 100).unwrap();
    assert!(response.entries.is_empty());

    let response =
        build_replication_response(&store, &request(&[("node-a", 60)]), 100).unwrap();
    assert!(response.entries.is_empty());
}

#[test]
fn test_selection_unknown_author_only() {
    let store = multi_author_store();
    let response =
        build_replication_response(&store, &request(&[("node-e", 0)]), 100).unwrap();
    assert!(response.entries.is_empty());
}

#[test]
fn test_selection_empty_request() {
    let store = multi_author_store();
    let response =
        build_replication_response(&store, &ReplicationRequest::default(), 100).unwrap();
    assert!(response.entries.is_empty());
}

#[test]
fn test_selection_never_exceeds_limit() {
    let store = multi_author_store();
    let request = request(&[("node-a", 0), ("node-c", 0), ("node-d", 0)]);

    for limit in [1, 10, 77, 1000] {
        let response = build_replication_response(&store, &request, limit).unwrap();
        assert!(response.entries.len() <= limit);
    }
}

#[test]
fn test_selection_streams_current_row_state() {
    let store = AccessStore::open_temporary(node("node-a"), HOUR).unwrap();
    store.put_at(&kh("node-a", 1), &payload(), NOW).unwrap();
    store
        .invalidate_at(&kh("node-a", 1), "revoked", NOW)
        .unwrap();

    let response =
        build_replication_response(&store, &request(&[("node-a", 0)]), 100).unwrap();

    // Two log entries, both carrying the row as it stands now.
    assert_eq!(response.entries.len(), 2);
    for entry in &response.entries {
        assert_eq!(entry.record.state, RecordState::Invalidated);
        assert_eq!(entry.record.clock, 2);
    }
}

#[test]
fn test_selection_skips_entries_without_rows() {
    let store = AccessStore::open_temporary(node("node-a"), HOUR).unwrap();
    store.put_at(&kh("node-a", 1), &payload(), NOW).unwrap();
    store.delete_at(&kh("node-a", 1), NOW).unwrap();

    // Reclaim the tombstone; the CREATED entry has no TTL and survives.
    store.collect_garbage(NOW + HOUR.as_secs() + 1).unwrap();

    let response =
        build_replication_response(&store, &request(&[("node-a", 0)]), 100).unwrap();
    assert!(response.entries.is_empty());
}

#[tokio::test]
async fn test_service_answers_ping_and_replicate() {
    let store = Arc::new(multi_author_store());
    let service = ReplicationService::new(store, 25);

    match service.handle(NodeMessage::PingRequest).await {
        NodeMessage::PingResponse { node_id } => assert_eq!(node_id, node("node-a")),
        other => panic!("expected ping response, got {other:?}"),
    }

    let request = request(&[("node-a", 0)]);
    match service.handle(NodeMessage::Replicate(request)).await {
        NodeMessage::ReplicateOk(response) => assert_eq!(response.entries.len(), 25),
        other => panic!("expected replication response, got {other:?}"),
    }

    // A response frame is not a valid request.
    let bogus = NodeMessage::PingResponse {
        node_id: node("node-x"),
    };
    assert!(matches!(
        service.handle(bogus).await,
        NodeMessage::Error { .. }
    ));
}
