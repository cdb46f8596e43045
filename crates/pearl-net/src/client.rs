//! Outgoing RPC connections.

use std::time::Duration;

use pearl_types::NodeId;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::codec::{read_frame, write_frame};
use crate::error::NetError;
use crate::message::{NodeMessage, ReplicationRequest, ReplicationResponse};
use crate::tls::TlsIdentity;

/// Deadline for TCP connect plus TLS handshake.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for one request/response exchange.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A pooled client connection to one peer.
///
/// Requests are sequential: one frame out, one frame back. The replicator
/// caches one client per peer and drops it on any error, reconnecting on the
/// next cycle.
pub struct NodeClient {
    stream: TlsStream<TcpStream>,
    peer_addr: String,
}

impl NodeClient {
    /// Dial `addr` (`host:port`) and complete the mTLS handshake.
    ///
    /// The host part doubles as the TLS server name, so peer certificates
    /// must carry it as a DNS or IP subject alternative name.
    pub async fn connect(addr: &str, tls: &TlsIdentity) -> Result<Self, NetError> {
        let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| NetError::Connect(format!("invalid server name {host:?}: {e}")))?;

        let tcp = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::Timeout(DIAL_TIMEOUT))?
            .map_err(|e| NetError::Connect(format!("failed to dial {addr}: {e}")))?;

        let connector = TlsConnector::from(tls.client.clone());
        let stream = timeout(DIAL_TIMEOUT, connector.connect(server_name, tcp))
            .await
            .map_err(|_| NetError::Timeout(DIAL_TIMEOUT))?
            .map_err(|e| NetError::Connect(format!("tls handshake with {addr} failed: {e}")))?;

        debug!(addr, "connected to peer");
        Ok(Self {
            stream,
            peer_addr: addr.to_string(),
        })
    }

    /// Address this client was dialed against.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Identity probe: returns the serving node's id.
    pub async fn ping(&mut self) -> Result<NodeId, NetError> {
        match self.request(&NodeMessage::PingRequest).await? {
            NodeMessage::PingResponse { node_id } => Ok(node_id),
            other => Err(NetError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Pull replication entries past the requested high-water marks.
    pub async fn replicate(
        &mut self,
        request: ReplicationRequest,
    ) -> Result<ReplicationResponse, NetError> {
        match self.request(&NodeMessage::Replicate(request)).await? {
            NodeMessage::ReplicateOk(response) => Ok(response),
            other => Err(NetError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    async fn request(&mut self, message: &NodeMessage) -> Result<NodeMessage, NetError> {
        let exchange = async {
            write_frame(&mut self.stream, message).await?;
            read_frame(&mut self.stream).await
        };
        let response = timeout(REQUEST_TIMEOUT, exchange)
            .await
            .map_err(|_| NetError::Timeout(REQUEST_TIMEOUT))??;

        match response {
            NodeMessage::Error { message } => Err(NetError::Remote(message)),
            other => Ok(other),
        }
    }
}
