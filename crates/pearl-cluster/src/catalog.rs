//! The static peer catalog.

use pearl_types::NodeId;

/// One configured peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    /// The peer's node id.
    pub node_id: NodeId,
    /// The peer's RPC address (`host:port`).
    pub address: String,
}

/// Immutable set of trusted peers, fixed at node start.
#[derive(Debug, Clone, Default)]
pub struct PeerCatalog {
    peers: Vec<PeerEntry>,
}

impl PeerCatalog {
    /// Build a catalog from configured entries. The local node must not be
    /// listed; duplicate ids keep the first entry.
    pub fn new(mut entries: Vec<PeerEntry>, local: NodeId) -> Self {
        entries.retain(|entry| entry.node_id != local);
        let mut peers: Vec<PeerEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !peers.iter().any(|p| p.node_id == entry.node_id) {
                peers.push(entry);
            }
        }
        Self { peers }
    }

    /// All configured peers, in configuration order.
    pub fn peers(&self) -> &[PeerEntry] {
        &self.peers
    }

    /// Look up a peer's address.
    pub fn address_of(&self, node_id: &NodeId) -> Option<&str> {
        self.peers
            .iter()
            .find(|entry| entry.node_id == *node_id)
            .map(|entry| entry.address.as_str())
    }

    /// Whether the catalog knows this node id.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.peers.iter().any(|entry| entry.node_id == *node_id)
    }

    /// Number of configured peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the node runs without peers.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
