//! Node lifecycle and the gateway-facing KV facade.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pearl_cluster::{PeerCatalog, PeerEntry, PeerStatus, PeerTracker};
use pearl_net::{RpcServer, TlsOptions};
use pearl_store::AccessStore;
use pearl_sync::{ReplicationService, Replicator, ReplicatorHandle};
use pearl_types::{KeyHash, NodeId, Record, RecordPayload};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::NodeError;

/// How often the maintenance task reclaims expired rows and tombstones.
const GC_INTERVAL: Duration = Duration::from_secs(3600);

/// Everything a node needs to start. Nothing here changes after start.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's id, unique in the cluster.
    pub id: NodeId,
    /// RPC listen address (`host:port`).
    pub address: String,
    /// Directory holding `ca.crt`, `node.crt`, `node.key`.
    pub certs_dir: PathBuf,
    /// Directory for the embedded database.
    pub storage_dir: PathBuf,
    /// The other cluster members.
    pub peers: Vec<PeerEntry>,
    /// Sync cycle period.
    pub replication_interval: Duration,
    /// Maximum entries per replication response.
    pub replication_limit: usize,
    /// How long tombstones are retained. Must exceed the longest plausible
    /// partition, otherwise a slow peer can miss a deletion entirely.
    pub tombstone_expiration: Duration,
}

/// A running Pearl node.
///
/// Owns the store, the replicator, the RPC server, and the maintenance task.
/// All of them stop on [`close`](Self::close); facade calls after that fail
/// with [`NodeError::Cancelled`].
pub struct Node {
    store: Arc<AccessStore>,
    catalog: Arc<PeerCatalog>,
    tracker: Arc<PeerTracker>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    replicator: Mutex<Option<ReplicatorHandle>>,
    server: Mutex<Option<RpcServer>>,
    gc_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Node {
    /// Open the store, load certificates, bind the RPC listener, and spawn
    /// the background tasks. Any failure here is fatal.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let store = Arc::new(AccessStore::open(
            &config.storage_dir,
            config.id,
            config.tombstone_expiration,
        )?);
        let tls = TlsOptions {
            certs_dir: config.certs_dir.clone(),
        }
        .load()?;

        let catalog = Arc::new(PeerCatalog::new(config.peers.clone(), config.id));
        let tracker = Arc::new(PeerTracker::new());

        let service = Arc::new(ReplicationService::new(
            store.clone(),
            config.replication_limit,
        ));
        let server = RpcServer::bind(&config.address, &tls, service).await?;
        let local_addr = server.local_addr();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let replicator = Replicator::new(
            store.clone(),
            catalog.clone(),
            tracker.clone(),
            tls,
            config.replication_interval,
        )
        .spawn(shutdown_rx.clone());

        let gc_task = tokio::spawn(maintenance_loop(store.clone(), shutdown_rx));

        info!(
            node_id = %config.id,
            %local_addr,
            peers = catalog.len(),
            "node started"
        );

        Ok(Self {
            store,
            catalog,
            tracker,
            local_addr,
            shutdown,
            replicator: Mutex::new(Some(replicator)),
            server: Mutex::new(Some(server)),
            gc_task: Mutex::new(Some(gc_task)),
            closed: AtomicBool::new(false),
        })
    }

    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.store.node_id()
    }

    /// The bound RPC address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The configured peer set.
    pub fn catalog(&self) -> &PeerCatalog {
        &self.catalog
    }

    /// The underlying store. For tests and tooling.
    pub fn store(&self) -> &AccessStore {
        &self.store
    }

    // -------------------------------------------------------------------
    // KV facade
    // -------------------------------------------------------------------

    /// Create a credential record.
    pub fn put(&self, key_hash: &KeyHash, payload: &RecordPayload) -> Result<(), NodeError> {
        self.ensure_open()?;
        Ok(self.store.put(key_hash, payload)?)
    }

    /// Resolve a credential.
    ///
    /// `None` for missing, deleted, or expired records;
    /// [`NodeError::Invalidated`] for invalidated ones.
    pub fn get(&self, key_hash: &KeyHash) -> Result<Option<Record>, NodeError> {
        self.ensure_open()?;
        Ok(self.store.get(key_hash)?)
    }

    /// Invalidate a credential with a reason.
    pub fn invalidate(&self, key_hash: &KeyHash, reason: &str) -> Result<(), NodeError> {
        self.ensure_open()?;
        Ok(self.store.invalidate(key_hash, reason)?)
    }

    /// Delete a credential (tombstoned, then reclaimed after
    /// `tombstone_expiration`).
    pub fn delete(&self, key_hash: &KeyHash) -> Result<(), NodeError> {
        self.ensure_open()?;
        Ok(self.store.delete(key_hash)?)
    }

    /// Storage liveness probe.
    pub fn health(&self) -> Result<(), NodeError> {
        self.ensure_open()?;
        Ok(self.store.health()?)
    }

    // -------------------------------------------------------------------
    // Observability and tests
    // -------------------------------------------------------------------

    /// Run one sync cycle now and wait for it.
    pub async fn trigger_sync(&self) {
        let guard = self.replicator.lock().await;
        if let Some(handle) = guard.as_ref() {
            handle.trigger_wait().await;
        }
    }

    /// Current per-peer sync statuses.
    pub fn peer_statuses(&self) -> Vec<(NodeId, PeerStatus)> {
        self.tracker.statuses()
    }

    /// Stop the background tasks and the RPC server. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);

        let replicator = self.replicator.lock().await.take();
        if let Some(mut handle) = replicator {
            handle.join().await;
        }
        let server = self.server.lock().await.take();
        if let Some(server) = server {
            server.shutdown().await;
        }
        let gc_task = self.gc_task.lock().await.take();
        if let Some(task) = gc_task {
            let _ = task.await;
        }

        info!(node_id = %self.id(), "node stopped");
    }

    fn ensure_open(&self) -> Result<(), NodeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NodeError::Cancelled);
        }
        Ok(())
    }
}

/// Periodic reclamation of expired rows and tombstones.
async fn maintenance_loop(store: Arc<AccessStore>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(GC_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        match store.collect_garbage(unix_now()) {
            Ok(stats) if stats.records_removed > 0 || stats.log_entries_removed > 0 => {
                info!(
                    records = stats.records_removed,
                    log_entries = stats.log_entries_removed,
                    "maintenance sweep reclaimed expired rows"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(%e, "maintenance sweep failed"),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
