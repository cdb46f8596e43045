//! Certificate loading and rustls configuration.
//!
//! Every node holds a leaf certificate issued under the cluster's shared CA.
//! The server side demands a CA-verified client certificate, the client side
//! verifies the server against the same CA, so only cluster members can
//! complete a handshake in either direction.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};

use crate::error::NetError;

/// Location of a node's certificate material.
///
/// The directory must contain `ca.crt` (the shared cluster CA), `node.crt`
/// (this node's leaf, possibly with intermediates) and `node.key` (PKCS#8
/// private key), all PEM-encoded.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Directory holding `ca.crt`, `node.crt`, `node.key`.
    pub certs_dir: PathBuf,
}

/// Loaded rustls configurations for both connection directions.
#[derive(Clone)]
pub struct TlsIdentity {
    /// Server-side configuration: requires CA-verified client certificates.
    pub server: Arc<ServerConfig>,
    /// Client-side configuration: presents the node certificate, verifies
    /// the server against the shared CA.
    pub client: Arc<ClientConfig>,
}

impl TlsOptions {
    /// Load and validate the certificate material.
    ///
    /// Failures here are fatal at node start.
    pub fn load(&self) -> Result<TlsIdentity, NetError> {
        let ca = read_certs(&self.certs_dir.join("ca.crt"))?;
        if ca.is_empty() {
            return Err(NetError::Certificate("ca.crt contains no certificates".into()));
        }

        let mut roots = RootCertStore::empty();
        for cert in ca {
            roots
                .add(cert)
                .map_err(|e| NetError::Certificate(format!("failed to add CA root: {e}")))?;
        }
        let roots = Arc::new(roots);

        let chain = read_certs(&self.certs_dir.join("node.crt"))?;
        if chain.is_empty() {
            return Err(NetError::Certificate("node.crt contains no certificates".into()));
        }
        let key = read_private_key(&self.certs_dir.join("node.key"))?;

        let client_verifier = WebPkiClientVerifier::builder(roots.clone())
            .build()
            .map_err(|e| NetError::Certificate(format!("failed to build client verifier: {e}")))?;
        let server = ServerConfig::builder()
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(chain.clone(), key.clone_key())
            .map_err(|e| NetError::Certificate(format!("failed to build server config: {e}")))?;

        let client = ClientConfig::builder()
            .with_root_certificates(roots.as_ref().clone())
            .with_client_auth_cert(chain, key)
            .map_err(|e| NetError::Certificate(format!("failed to build client config: {e}")))?;

        Ok(TlsIdentity {
            server: Arc::new(server),
            client: Arc::new(client),
        })
    }
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, NetError> {
    let file = File::open(path)
        .map_err(|e| NetError::Certificate(format!("failed to open {}: {e}", path.display())))?;
    certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| NetError::Certificate(format!("failed to parse {}: {e}", path.display())))
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, NetError> {
    let file = File::open(path)
        .map_err(|e| NetError::Certificate(format!("failed to open {}: {e}", path.display())))?;
    let keys = pkcs8_private_keys(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| NetError::Certificate(format!("failed to parse {}: {e}", path.display())))?;

    keys.into_iter()
        .next()
        .map(PrivateKeyDer::Pkcs8)
        .ok_or_else(|| {
            NetError::Certificate(format!("no PKCS#8 private key in {}", path.display()))
        })
}
