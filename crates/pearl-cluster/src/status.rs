//! Runtime peer status.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use pearl_types::NodeId;
use tracing::debug;

/// Outcome of the most recent sync attempt against one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerStatus {
    /// When the last sync attempt finished.
    pub last_sync_at: Option<SystemTime>,
    /// Whether the last attempt reached the peer.
    pub last_was_up: bool,
    /// Error message of the last failed attempt, cleared on success.
    pub last_error: Option<String>,
    /// Round-trip of the last successful ping.
    pub last_round_trip: Option<Duration>,
}

/// Shared, read-mostly map of peer statuses maintained by the replicator.
#[derive(Debug, Default)]
pub struct PeerTracker {
    statuses: RwLock<HashMap<NodeId, PeerStatus>>,
}

impl PeerTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful sync against `peer`.
    pub fn record_success(&self, peer: NodeId, round_trip: Duration) {
        let mut statuses = self.statuses.write().expect("peer tracker lock poisoned");
        statuses.insert(
            peer,
            PeerStatus {
                last_sync_at: Some(SystemTime::now()),
                last_was_up: true,
                last_error: None,
                last_round_trip: Some(round_trip),
            },
        );
    }

    /// Record a failed sync against `peer`.
    pub fn record_failure(&self, peer: NodeId, error: &str) {
        debug!(%peer, error, "sync attempt failed");
        let mut statuses = self.statuses.write().expect("peer tracker lock poisoned");
        let status = statuses.entry(peer).or_default();
        status.last_sync_at = Some(SystemTime::now());
        status.last_was_up = false;
        status.last_error = Some(error.to_string());
    }

    /// Status of one peer, if any attempt was made yet.
    pub fn status(&self, peer: &NodeId) -> Option<PeerStatus> {
        self.statuses
            .read()
            .expect("peer tracker lock poisoned")
            .get(peer)
            .cloned()
    }

    /// Snapshot of all peer statuses.
    pub fn statuses(&self) -> Vec<(NodeId, PeerStatus)> {
        self.statuses
            .read()
            .expect("peer tracker lock poisoned")
            .iter()
            .map(|(id, status)| (*id, status.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeId {
        NodeId::from_name(name).unwrap()
    }

    #[test]
    fn test_tracker_records_success() {
        let tracker = PeerTracker::new();
        tracker.record_success(node("node-b"), Duration::from_millis(3));

        let status = tracker.status(&node("node-b")).unwrap();
        assert!(status.last_was_up);
        assert!(status.last_sync_at.is_some());
        assert_eq!(status.last_error, None);
        assert_eq!(status.last_round_trip, Some(Duration::from_millis(3)));
    }

    #[test]
    fn test_tracker_failure_then_recovery() {
        let tracker = PeerTracker::new();
        tracker.record_failure(node("node-b"), "connection refused");

        let status = tracker.status(&node("node-b")).unwrap();
        assert!(!status.last_was_up);
        assert_eq!(status.last_error.as_deref(), Some("connection refused"));

        tracker.record_success(node("node-b"), Duration::from_millis(1));
        let status = tracker.status(&node("node-b")).unwrap();
        assert!(status.last_was_up);
        assert_eq!(status.last_error, None);
    }

    #[test]
    fn test_tracker_unknown_peer() {
        let tracker = PeerTracker::new();
        assert_eq!(tracker.status(&node("node-z")), None);
        assert!(tracker.statuses().is_empty());
    }
}
