//! Length-prefixed postcard framing shared by client and server.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetError;
use crate::message::NodeMessage;

/// Maximum frame size: 16 MiB. A replication response carries at most
/// `replication_limit` records, each a few KiB of encrypted material.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Write one message as a 4-byte big-endian length prefix plus postcard body.
pub async fn write_frame<S>(stream: &mut S, message: &NodeMessage) -> Result<(), NetError>
where
    S: AsyncWrite + Unpin,
{
    let payload =
        postcard::to_allocvec(message).map_err(|e| NetError::Serialization(e.to_string()))?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::Serialization(format!(
            "message too large: {} bytes (max {MAX_MESSAGE_SIZE})",
            payload.len()
        )));
    }

    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed message.
pub async fn read_frame<S>(stream: &mut S) -> Result<NodeMessage, NetError>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(NetError::Serialization(format!(
            "message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"
        )));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    postcard::from_bytes(&payload).map_err(|e| NetError::Serialization(e.to_string()))
}
