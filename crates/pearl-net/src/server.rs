//! The RPC accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::codec::{read_frame, write_frame};
use crate::error::NetError;
use crate::message::NodeMessage;
use crate::tls::TlsIdentity;

/// Service side of the RPC protocol: one request in, one response out.
#[async_trait::async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Produce the response frame for one request frame.
    async fn handle(&self, message: NodeMessage) -> NodeMessage;
}

/// TCP listener serving the node RPC over mTLS.
///
/// Each accepted connection runs on its own task; frames on a connection are
/// served sequentially. Dropping the server does not stop it — call
/// [`RpcServer::shutdown`].
pub struct RpcServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl RpcServer {
    /// Bind `addr` and start accepting connections.
    pub async fn bind(
        addr: &str,
        tls: &TlsIdentity,
        handler: Arc<dyn RpcHandler>,
    ) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetError::Connect(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;
        let acceptor = TlsAcceptor::from(tls.server.clone());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, acceptor, handler, shutdown_rx));

        debug!(%local_addr, "rpc server listening");
        Ok(Self {
            local_addr,
            shutdown,
            accept_task,
        })
    }

    /// The bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close connection tasks, and wait for the accept loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.accept_task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handler: Arc<dyn RpcHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("rpc server shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((tcp, remote)) => {
                    let acceptor = acceptor.clone();
                    let handler = handler.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    tokio::spawn(async move {
                        serve_connection(acceptor, tcp, remote, handler, shutdown_rx).await;
                    });
                }
                Err(e) => {
                    warn!(%e, "failed to accept connection");
                }
            },
        }
    }
}

async fn serve_connection(
    acceptor: TlsAcceptor,
    tcp: TcpStream,
    remote: SocketAddr,
    handler: Arc<dyn RpcHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut stream = match acceptor.accept(tcp).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(%remote, %e, "tls handshake failed");
            return;
        }
    };

    loop {
        let request = tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = read_frame(&mut stream) => match frame {
                Ok(message) => message,
                Err(NetError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!(%remote, "connection closed");
                    break;
                }
                Err(e) => {
                    debug!(%remote, %e, "failed to read frame");
                    break;
                }
            },
        };

        let response = handler.handle(request).await;
        if let Err(e) = write_frame(&mut stream, &response).await {
            debug!(%remote, %e, "failed to write response");
            break;
        }
    }
}
