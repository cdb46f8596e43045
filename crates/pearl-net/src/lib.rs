//! Node-to-node RPC for Pearl.
//!
//! Two methods travel over mutually-authenticated TLS on a single TCP
//! listener: a ping (identity/liveness) and the replication pull. Messages
//! are postcard-serialized with a 4-byte big-endian length prefix.
//!
//! - [`NodeMessage`] — the wire protocol.
//! - [`TlsOptions`] — loads `ca.crt` / `node.crt` / `node.key` from a
//!   directory and builds the rustls client and server configurations.
//! - [`NodeClient`] — dials a peer and issues requests.
//! - [`RpcServer`] + [`RpcHandler`] — accept loop dispatching to the
//!   service implementation.

mod client;
mod codec;
mod error;
mod message;
mod server;
mod tls;

#[cfg(test)]
mod tests;

pub use client::{NodeClient, DIAL_TIMEOUT, REQUEST_TIMEOUT};
pub use codec::{read_frame, write_frame, MAX_MESSAGE_SIZE};
pub use error::NetError;
pub use message::{
    ClockEntry, NodeMessage, ReplicationEntry, ReplicationRequest, ReplicationResponse,
};
pub use server::{RpcHandler, RpcServer};
pub use tls::{TlsIdentity, TlsOptions};
