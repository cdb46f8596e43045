//! Tests for the pearl-net crate.

use std::path::Path;
use std::sync::Arc;

use pearl_types::{KeyHash, NodeId, Record, RecordState};
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, SanType};

use crate::codec::{read_frame, write_frame};
use crate::message::{
    ClockEntry, NodeMessage, ReplicationEntry, ReplicationRequest, ReplicationResponse,
};
use crate::server::{RpcHandler, RpcServer};
use crate::{NetError, NodeClient, TlsOptions};

/// Generate a self-signed test CA.
fn test_ca() -> (Certificate, KeyPair) {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, "pearl test ca");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

/// Issue a leaf certificate for a node, valid for loopback connections.
fn node_cert(name: &str, ca: &Certificate, ca_key: &KeyPair) -> (Certificate, KeyPair) {
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
    (cert, key)
}

/// Write `ca.crt` / `node.crt` / `node.key` for one node into `dir`.
fn write_certs_dir(dir: &Path, name: &str, ca: &Certificate, ca_key: &KeyPair) {
    let (cert, key) = node_cert(name, ca, ca_key);
    std::fs::write(dir.join("ca.crt"), ca.pem()).unwrap();
    std::fs::write(dir.join("node.crt"), cert.pem()).unwrap();
    std::fs::write(dir.join("node.key"), key.serialize_pem()).unwrap();
}

struct StaticHandler {
    node_id: NodeId,
}

#[async_trait::async_trait]
impl RpcHandler for StaticHandler {
    async fn handle(&self, message: NodeMessage) -> NodeMessage {
        match message {
            NodeMessage::PingRequest => NodeMessage::PingResponse {
                node_id: self.node_id,
            },
            NodeMessage::Replicate(_) => NodeMessage::ReplicateOk(ReplicationResponse::default()),
            other => NodeMessage::Error {
                message: format!("unexpected request: {other:?}"),
            },
        }
    }
}

fn sample_record() -> Record {
    Record {
        node_id: NodeId::from_name("node-a").unwrap(),
        clock: 3,
        created_at: 1_700_000_000,
        state: RecordState::Created,
        satellite_address: "sat.example.test:7777".to_string(),
        macaroon_head: b"head".to_vec(),
        encrypted_secret_key: b"secret".to_vec(),
        encrypted_access_grant: b"grant".to_vec(),
        public: true,
        expires_at: None,
        invalidation_reason: None,
        invalidated_at: None,
        tombstoned_at: None,
    }
}

#[tokio::test]
async fn test_message_roundtrip_postcard() {
    let messages = vec![
        NodeMessage::PingRequest,
        NodeMessage::PingResponse {
            node_id: NodeId::from_name("node-a").unwrap(),
        },
        NodeMessage::Replicate(ReplicationRequest {
            entries: vec![ClockEntry {
                node_id: NodeId::from_name("node-b").unwrap(),
                clock: 42,
            }],
        }),
        NodeMessage::ReplicateOk(ReplicationResponse {
            entries: vec![ReplicationEntry {
                node_id: NodeId::from_name("node-a").unwrap(),
                key_hash: KeyHash::from([7u8; 32]),
                record: sample_record(),
            }],
        }),
        NodeMessage::Error {
            message: "boom".to_string(),
        },
    ];

    for message in &messages {
        let encoded = postcard::to_allocvec(message).unwrap();
        let decoded: NodeMessage = postcard::from_bytes(&encoded).unwrap();
        assert_eq!(message, &decoded);
    }
}

#[tokio::test]
async fn test_frame_roundtrip() {
    let (mut a, mut b) = tokio::io::duplex(1024);

    let message = NodeMessage::PingResponse {
        node_id: NodeId::from_name("node-a").unwrap(),
    };
    write_frame(&mut a, &message).await.unwrap();
    let decoded = read_frame(&mut b).await.unwrap();
    assert_eq!(decoded, message);
}

#[tokio::test]
async fn test_frame_rejects_oversized_length() {
    let (mut a, mut b) = tokio::io::duplex(64);

    // A hand-written prefix claiming a frame far past the cap.
    tokio::io::AsyncWriteExt::write_all(&mut a, &(u32::MAX).to_be_bytes())
        .await
        .unwrap();
    let err = read_frame(&mut b).await.unwrap_err();
    assert!(matches!(err, NetError::Serialization(_)));
}

#[tokio::test]
async fn test_ping_over_mtls() {
    let (ca, ca_key) = test_ca();
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    write_certs_dir(server_dir.path(), "server", &ca, &ca_key);
    write_certs_dir(client_dir.path(), "client", &ca, &ca_key);

    let server_tls = TlsOptions {
        certs_dir: server_dir.path().to_path_buf(),
    }
    .load()
    .unwrap();
    let client_tls = TlsOptions {
        certs_dir: client_dir.path().to_path_buf(),
    }
    .load()
    .unwrap();

    let node_id = NodeId::from_name("server").unwrap();
    let server = RpcServer::bind(
        "127.0.0.1:0",
        &server_tls,
        Arc::new(StaticHandler { node_id }),
    )
    .await
    .unwrap();
    let addr = server.local_addr().to_string();

    let mut client = NodeClient::connect(&addr, &client_tls).await.unwrap();
    assert_eq!(client.ping().await.unwrap(), node_id);

    // The connection stays usable for further requests.
    let response = client
        .replicate(ReplicationRequest::default())
        .await
        .unwrap();
    assert!(response.entries.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_rejects_foreign_ca() {
    let (ca, ca_key) = test_ca();
    let (rogue_ca, rogue_ca_key) = test_ca();

    let server_dir = tempfile::tempdir().unwrap();
    let rogue_dir = tempfile::tempdir().unwrap();
    write_certs_dir(server_dir.path(), "server", &ca, &ca_key);
    write_certs_dir(rogue_dir.path(), "rogue", &rogue_ca, &rogue_ca_key);

    let server_tls = TlsOptions {
        certs_dir: server_dir.path().to_path_buf(),
    }
    .load()
    .unwrap();
    let rogue_tls = TlsOptions {
        certs_dir: rogue_dir.path().to_path_buf(),
    }
    .load()
    .unwrap();

    let server = RpcServer::bind(
        "127.0.0.1:0",
        &server_tls,
        Arc::new(StaticHandler {
            node_id: NodeId::from_name("server").unwrap(),
        }),
    )
    .await
    .unwrap();
    let addr = server.local_addr().to_string();

    // The rogue node trusts a different CA, so the server certificate fails
    // verification during the handshake.
    let result = NodeClient::connect(&addr, &rogue_tls).await;
    assert!(result.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_load_missing_certs_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = TlsOptions {
        certs_dir: dir.path().join("nope"),
    }
    .load();
    assert!(matches!(result, Err(NetError::Certificate(_))));
}
