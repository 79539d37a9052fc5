//! One-shot echo client

use bytes::Bytes;
use secure_channel::{ChannelConfig, SecureChannel};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::{EchoError, EchoResult};

/// Connect, optionally send one message, and return the echoed reply
///
/// Without a message only the handshake is performed and `Ok(None)` is
/// returned. The server does not answer empty messages, so an empty
/// message returns an empty reply without waiting.
pub async fn echo_once<A: ToSocketAddrs>(
    addr: A,
    message: Option<&[u8]>,
    config: ChannelConfig,
) -> EchoResult<Option<Bytes>> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let mut channel = SecureChannel::open_with_config(stream, config).await?;

    let reply = match message {
        None => None,
        Some([]) => {
            channel.write(&[]).await?;
            Some(Bytes::new())
        }
        Some(message) => {
            channel.write(message).await?;
            let reply = channel.recv().await?.ok_or(EchoError::NoReply)?;
            debug!(sent = message.len(), received = reply.len(), "Echo received");
            Some(reply)
        }
    };

    channel.close().await?;
    Ok(reply)
}
