//! # Wire Framing
//!
//! Every message is a 4-byte big-endian length followed by that many
//! payload bytes. An announced length past the cap is a protocol
//! violation: the caller closes the connection and debits the peer.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetworkError;
use crate::MAX_FRAME_SIZE;

/// Read one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(NetworkError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one length-prefixed frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(NetworkError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
