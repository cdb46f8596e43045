//! Shared test scaffolding: throwaway CAs, certificates, and clusters.

use std::path::Path;
use std::time::Duration;

use pearl_cluster::PeerEntry;
use pearl_types::{KeyHash, NodeId, Record, RecordPayload};
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, SanType};
use tempfile::TempDir;

use crate::{Node, NodeConfig};

/// Long enough that the periodic cycle never fires during a test; every
/// cycle is driven explicitly through `trigger_sync`.
const TEST_INTERVAL: Duration = Duration::from_secs(3600);

const TEST_TOMBSTONE_EXPIRATION: Duration = Duration::from_secs(720 * 3600);

/// Generate a self-signed test CA.
pub fn test_ca() -> (Certificate, KeyPair) {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, "pearl test ca");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

/// Write `ca.crt` / `node.crt` / `node.key` for one node into `dir`.
pub fn write_certs_dir(dir: &Path, name: &str, ca: &Certificate, ca_key: &KeyPair) {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, name);
    params
        .subject_alt_names
        .push(SanType::DnsName("localhost".try_into().unwrap()));
    params
        .subject_alt_names
        .push(SanType::IpAddress("127.0.0.1".parse().unwrap()));
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, ca, ca_key).unwrap();

    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("ca.crt"), ca.pem()).unwrap();
    std::fs::write(dir.join("node.crt"), cert.pem()).unwrap();
    std::fs::write(dir.join("node.key"), key.serialize_pem()).unwrap();
}

/// Reserve `count` distinct loopback ports.
pub fn reserve_ports(count: usize) -> Vec<u16> {
    let listeners: Vec<_> = (0..count)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    listeners
        .iter()
        .map(|l| l.local_addr().unwrap().port())
        .collect()
}

/// Build a node config rooted at `dir`, with certificates already written.
pub fn node_config(
    dir: &Path,
    name: &str,
    port: u16,
    peers: Vec<PeerEntry>,
    ca: &(Certificate, KeyPair),
    replication_limit: usize,
) -> NodeConfig {
    let certs_dir = dir.join("certs");
    write_certs_dir(&certs_dir, name, &ca.0, &ca.1);
    NodeConfig {
        id: NodeId::from_name(name).unwrap(),
        address: format!("127.0.0.1:{port}"),
        certs_dir,
        storage_dir: dir.join("storage"),
        peers,
        replication_interval: TEST_INTERVAL,
        replication_limit,
        tombstone_expiration: TEST_TOMBSTONE_EXPIRATION,
    }
}

/// A running cluster of loopback nodes under one throwaway CA.
pub struct TestCluster {
    pub nodes: Vec<Node>,
    _dirs: Vec<TempDir>,
}

impl TestCluster {
    /// Start `count` nodes with the default replication limit.
    pub async fn start(count: usize) -> Self {
        Self::start_with_limit(count, 1000).await
    }

    /// Start `count` nodes capping responses at `replication_limit`.
    pub async fn start_with_limit(count: usize, replication_limit: usize) -> Self {
        let ca = test_ca();
        let ports = reserve_ports(count);
        let names: Vec<String> = (0..count).map(|i| format!("node-{i}")).collect();

        let mut nodes = Vec::with_capacity(count);
        let mut dirs = Vec::with_capacity(count);
        for i in 0..count {
            let dir = tempfile::tempdir().unwrap();
            let peers = (0..count)
                .filter(|&j| j != i)
                .map(|j| PeerEntry {
                    node_id: NodeId::from_name(&names[j]).unwrap(),
                    address: format!("127.0.0.1:{}", ports[j]),
                })
                .collect();
            let config = node_config(dir.path(), &names[i], ports[i], peers, &ca, replication_limit);
            nodes.push(Node::start(config).await.unwrap());
            dirs.push(dir);
        }

        Self { nodes, _dirs: dirs }
    }

    /// Trigger one sync cycle on every node, in the given order.
    pub async fn sync_round_ordered(&self, order: &[usize]) {
        for &i in order {
            self.nodes[i].trigger_sync().await;
        }
    }

    /// Trigger `rounds` sync cycles on every node, in index order.
    pub async fn sync_rounds(&self, rounds: usize) {
        let order: Vec<usize> = (0..self.nodes.len()).collect();
        for _ in 0..rounds {
            self.sync_round_ordered(&order).await;
        }
    }

    /// Close every node.
    pub async fn close(self) {
        for node in &self.nodes {
            node.close().await;
        }
    }
}

/// A distinct payload per `(author, index)` pair.
pub fn test_payload(author: &str, index: usize) -> RecordPayload {
    RecordPayload {
        satellite_address: format!("sat-{index}.example.test:7777"),
        macaroon_head: format!("{author}-head-{index}").into_bytes(),
        encrypted_secret_key: format!("{author}-secret-{index}").into_bytes(),
        encrypted_access_grant: format!("{author}-grant-{index}").into_bytes(),
        public: index % 2 == 0,
        expires_at: None,
    }
}

/// Create `count` records on `node` and return them as the expected view.
pub fn create_records(node: &Node, count: usize) -> Vec<(KeyHash, Record)> {
    let author = node.id().to_string();
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let key_hash = KeyHash::from_data(format!("{author}-{i}").as_bytes());
        node.put(&key_hash, &test_payload(&author, i)).unwrap();
        let record = node.get(&key_hash).unwrap().unwrap();
        records.push((key_hash, record));
    }
    records
}

/// Assert that every node resolves every expected record identically and
/// that all replication logs are equal.
pub fn assert_converged(cluster: &TestCluster, expected: &[(KeyHash, Record)]) {
    let reference = cluster.nodes[0].store().log_entries().unwrap();
    assert_eq!(reference.len(), expected.len());

    for node in &cluster.nodes {
        for (key_hash, record) in expected {
            let got = node
                .get(key_hash)
                .unwrap()
                .unwrap_or_else(|| panic!("{} missing on {}", key_hash, node.id()));
            assert_eq!(&got, record, "diverged record on {}", node.id());
        }
        assert_eq!(
            node.store().log_entries().unwrap(),
            reference,
            "diverged replication log on {}",
            node.id()
        );
    }
}
