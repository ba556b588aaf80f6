//! Reading and writing framed messages over a byte stream

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::ProtocolError;
use crate::protocol::message::{Message, HEADER_SIZE};

/// Errors from the framed stream helpers
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Read one message. Returns `Ok(None)` on a clean end of stream before a new
/// header starts.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, StreamError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    let first = reader.read(&mut header[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let (_, _, _, len) = Message::decode_header(&header)?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + len);
    frame.extend_from_slice(&header);
    frame.resize(HEADER_SIZE + len, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;

    Ok(Some(Message::decode_exact(&frame)?))
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
