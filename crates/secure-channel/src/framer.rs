//! Length-prefixed frames over an ordered byte stream

use box_crypto::Nonce;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use wire_protocol::{FrameHeader, HEADER_SIZE, encode_frame};

use crate::{ChannelError, ChannelResult};

/// One frame as read off the wire
#[derive(Debug, Clone)]
pub struct Frame {
    pub nonce: Nonce,
    pub sealed: Vec<u8>,
}

/// Write a single frame
///
/// The frame is encoded into one buffer and handed over with `write_all`,
/// which retries partial writes until the whole frame is on the transport.
pub async fn write_frame<W>(writer: &mut W, nonce: &Nonce, sealed: &[u8]) -> ChannelResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(nonce.to_bytes(), sealed)?;

    writer.write_all(&frame).await?;
    writer.flush().await?;

    debug!(len = frame.len(), "Wrote frame");
    Ok(())
}

/// Read a single frame
///
/// Returns `Ok(None)` when the transport ends cleanly on a frame boundary.
/// A body length above `max_body` is rejected before anything is allocated.
pub async fn read_frame<R>(reader: &mut R, max_body: usize) -> ChannelResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;

    while filled < HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                debug!("Transport closed at frame boundary");
                return Ok(None);
            }
            return Err(ChannelError::UnexpectedEof);
        }
        filled += n;
    }

    let header = FrameHeader::decode(&header)?;
    let body_len = header.body_len as usize;
    if body_len > max_body {
        return Err(ChannelError::FrameTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let mut sealed = vec![0u8; body_len];
    reader.read_exact(&mut sealed).await?;

    debug!(len = header.frame_len(), "Read frame");
    Ok(Some(Frame {
        nonce: Nonce::from_bytes(header.nonce),
        sealed,
    }))
}
