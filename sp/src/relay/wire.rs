//! Relay wire format
//!
//! A message is a single frame: `[u32 BE length][UTF-8 payload]`. After a
//! complete frame the primary answers with the three bytes `ack`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::CoordinationError;

/// Acknowledgment sent by the primary after each frame
pub const ACK: &[u8; 3] = b"ack";

/// Write one message frame and flush
pub async fn write_frame<W>(writer: &mut W, text: &str, max_size: usize) -> Result<(), CoordinationError>
where
    W: AsyncWrite + Unpin,
{
    let payload = text.as_bytes();
    if payload.len() > max_size {
        return Err(CoordinationError::MessageTooLarge {
            size: payload.len(),
            max: max_size,
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| CoordinationError::MessageTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    debug!(len, "write_frame: frame written");
    Ok(())
}

/// Read one message frame
///
/// The length header is checked against `max_size` before the payload is
/// allocated.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<String, CoordinationError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header) as usize;

    if len > max_size {
        return Err(CoordinationError::MessageTooLarge { size: len, max: max_size });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let text = String::from_utf8(payload).map_err(|e| CoordinationError::Protocol(format!("invalid UTF-8: {}", e)))?;
    debug!(len, "read_frame: frame read");
    Ok(text)
}

/// Send the acknowledgment
pub async fn write_ack<W>(writer: &mut W) -> Result<(), CoordinationError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(ACK).await?;
    writer.flush().await?;
    Ok(())
}

/// Wait for the acknowledgment
pub async fn read_ack<R>(reader: &mut R) -> Result<(), CoordinationError>
where
    R: AsyncRead + Unpin,
{
    let mut reply = [0u8; 3];
    reader.read_exact(&mut reply).await?;
    if &reply != ACK {
        return Err(CoordinationError::Protocol(format!(
            "unexpected acknowledgment: {:?}",
            String::from_utf8_lossy(&reply)
        )));
    }
    Ok(())
}
