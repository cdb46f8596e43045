//! The per-node sync cycle task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pearl_cluster::{PeerCatalog, PeerEntry, PeerTracker};
use pearl_net::{ClockEntry, NodeClient, ReplicationRequest, TlsIdentity};
use pearl_store::AccessStore;
use pearl_types::NodeId;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::SyncError;

/// Pull-replication driver: one long-lived task per node.
///
/// Every cycle the replicator contacts each configured peer, asks for log
/// entries past this node's high-water marks, and ingests the answers. A
/// failing peer aborts only its own share of the cycle.
pub struct Replicator {
    store: Arc<AccessStore>,
    catalog: Arc<PeerCatalog>,
    tracker: Arc<PeerTracker>,
    tls: TlsIdentity,
    interval: Duration,
    clients: HashMap<NodeId, NodeClient>,
}

impl Replicator {
    /// Create a replicator; it does nothing until [`spawn`](Self::spawn)ed.
    pub fn new(
        store: Arc<AccessStore>,
        catalog: Arc<PeerCatalog>,
        tracker: Arc<PeerTracker>,
        tls: TlsIdentity,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            catalog,
            tracker,
            tls,
            interval,
            clients: HashMap::new(),
        }
    }

    /// Start the cycle task. It stops when `shutdown` flips or the handle's
    /// trigger side is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> ReplicatorHandle {
        let (trigger, trigger_rx) = mpsc::channel(4);
        let task = tokio::spawn(self.run(shutdown, trigger_rx));
        ReplicatorHandle { trigger, task }
    }

    async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        mut trigger_rx: mpsc::Receiver<oneshot::Sender<()>>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh node does not
        // race its peers' startup.
        ticker.tick().await;

        loop {
            let ack = tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => None,
                cmd = trigger_rx.recv() => match cmd {
                    Some(ack) => Some(ack),
                    None => break,
                },
            };

            self.sync_all().await;

            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        }
        info!("replicator stopped");
    }

    /// One full cycle over all configured peers.
    async fn sync_all(&mut self) {
        let peers: Vec<PeerEntry> = self.catalog.peers().to_vec();
        for peer in peers {
            match self.sync_peer(&peer).await {
                Ok(round_trip) => self.tracker.record_success(peer.node_id, round_trip),
                Err(e) => {
                    // Drop the cached connection; the next cycle redials.
                    self.clients.remove(&peer.node_id);
                    self.tracker.record_failure(peer.node_id, &e.to_string());
                }
            }
        }
    }

    async fn sync_peer(&mut self, peer: &PeerEntry) -> Result<Duration, SyncError> {
        if !self.clients.contains_key(&peer.node_id) {
            let client = NodeClient::connect(&peer.address, &self.tls).await?;
            self.clients.insert(peer.node_id, client);
        }
        let request = self.build_request()?;
        let client = self
            .clients
            .get_mut(&peer.node_id)
            .expect("client just inserted");

        // Ping doubles as the identity cross-check: the address must belong
        // to the catalog's node id, not merely to some CA-certified node.
        let ping_started = Instant::now();
        let reported = client.ping().await?;
        let round_trip = ping_started.elapsed();
        if reported != peer.node_id {
            return Err(SyncError::IdentityMismatch {
                expected: peer.node_id,
                reported,
            });
        }

        let response = client.replicate(request).await?;

        let mut applied = 0usize;
        for entry in &response.entries {
            if entry.node_id != entry.record.node_id {
                warn!(
                    peer = %peer.node_id,
                    entry_author = %entry.node_id,
                    record_author = %entry.record.node_id,
                    "response entry author disagrees with its record, skipping"
                );
                continue;
            }
            self.store.insert_replicated(&entry.key_hash, &entry.record)?;
            applied += 1;
        }

        debug!(peer = %peer.node_id, applied, "sync cycle against peer complete");
        Ok(round_trip)
    }

    /// High-water vector for the request: self, every catalog peer, and
    /// every author this store has already ingested from.
    fn build_request(&self) -> Result<ReplicationRequest, SyncError> {
        let mut ids = vec![self.store.node_id()];
        for peer in self.catalog.peers() {
            if !ids.contains(&peer.node_id) {
                ids.push(peer.node_id);
            }
        }
        for (id, _) in self.store.clock_views()? {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut entries = Vec::with_capacity(ids.len());
        for node_id in ids {
            entries.push(ClockEntry {
                node_id,
                clock: self.store.clock(&node_id)?.unwrap_or(0),
            });
        }
        Ok(ReplicationRequest { entries })
    }
}

/// Control handle for a spawned [`Replicator`].
pub struct ReplicatorHandle {
    trigger: mpsc::Sender<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReplicatorHandle {
    /// Run one cycle now and wait for it to finish. For tests and tooling.
    pub async fn trigger_wait(&self) {
        let (ack, done) = oneshot::channel();
        if self.trigger.send(ack).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Wait for the task to exit after shutdown was signalled.
    pub async fn join(&mut self) {
        let _ = (&mut self.task).await;
    }
}
