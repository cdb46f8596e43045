//! The serving side of pull replication.

use std::sync::Arc;

use pearl_net::{
    NodeMessage, ReplicationEntry, ReplicationRequest, ReplicationResponse, RpcHandler,
};
use pearl_store::{AccessStore, StoreError};
use tracing::{debug, warn};

/// RPC service answering `Ping` and `Replicate` from the local store.
pub struct ReplicationService {
    store: Arc<AccessStore>,
    limit: usize,
}

impl ReplicationService {
    /// Create a service capping responses at `limit` entries.
    pub fn new(store: Arc<AccessStore>, limit: usize) -> Self {
        Self { store, limit }
    }
}

#[async_trait::async_trait]
impl RpcHandler for ReplicationService {
    async fn handle(&self, message: NodeMessage) -> NodeMessage {
        match message {
            NodeMessage::PingRequest => NodeMessage::PingResponse {
                node_id: self.store.node_id(),
            },
            NodeMessage::Replicate(request) => {
                match build_replication_response(&self.store, &request, self.limit) {
                    Ok(response) => NodeMessage::ReplicateOk(response),
                    Err(e) => {
                        warn!(%e, "failed to build replication response");
                        NodeMessage::Error {
                            message: e.to_string(),
                        }
                    }
                }
            }
            other => NodeMessage::Error {
                message: format!("unsupported request: {other:?}"),
            },
        }
    }
}

/// Select up to `limit` entries for a replication request.
///
/// Requested nodes are served in request order; the scan over each node's log
/// starts strictly past the requested clock. Nodes this store has never heard
/// of are skipped silently. Each log entry contributes the record row as
/// currently stored; entries whose row has been reclaimed are skipped.
pub fn build_replication_response(
    store: &AccessStore,
    request: &ReplicationRequest,
    limit: usize,
) -> Result<ReplicationResponse, StoreError> {
    let mut entries = Vec::new();

    for requested in &request.entries {
        if entries.len() >= limit {
            break;
        }
        if requested.node_id != store.node_id() && store.clock(&requested.node_id)?.is_none() {
            continue;
        }

        let remaining = limit - entries.len();
        for entry in store.read_log_after(&requested.node_id, requested.clock, remaining)? {
            match store.record_row(&entry.key_hash)? {
                Some(record) => entries.push(ReplicationEntry {
                    node_id: entry.node_id,
                    key_hash: entry.key_hash,
                    record,
                }),
                None => {
                    debug!(
                        key_hash = %entry.key_hash,
                        author = %entry.node_id,
                        clock = entry.clock,
                        "log entry without record row, skipping"
                    );
                }
            }
        }
    }

    Ok(ReplicationResponse { entries })
}
