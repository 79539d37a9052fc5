//! Concurrent secure echo server

use std::net::SocketAddr;

use secure_channel::{ChannelConfig, ChannelResult, SecureChannel};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{EchoError, EchoResult};

/// What one connection exchanged before it ended cleanly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Messages echoed back
    pub messages: u64,
    /// Plaintext bytes echoed back
    pub bytes: u64,
}

/// Echo server bound to a TCP listener
pub struct EchoServer {
    listener: TcpListener,
    config: ChannelConfig,
}

impl EchoServer {
    /// Bind a new listener
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: ChannelConfig) -> EchoResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| EchoError::Bind(e.to_string()))?;
        Ok(Self::from_listener(listener, config))
    }

    pub fn from_listener(listener: TcpListener, config: ChannelConfig) -> Self {
        Self { listener, config }
    }

    pub fn local_addr(&self) -> EchoResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails
    ///
    /// Every connection runs in its own task; a failure on one connection is
    /// logged and never reaches the others or the accept loop.
    pub async fn run(self) -> EchoResult<()> {
        info!(addr = ?self.listener.local_addr().ok(), "Echo server listening");

        let mut next_id: u64 = 0;
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Accept failed, stopping server");
                    return Err(EchoError::Accept(e.to_string()));
                }
            };

            next_id += 1;
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "Failed to set TCP_NODELAY");
            }

            let config = self.config;
            let span = info_span!("connection", id = next_id, %peer);
            tokio::spawn(
                async move {
                    info!("Connection accepted");
                    match handle_connection(stream, config).await {
                        Ok(summary) => info!(
                            messages = summary.messages,
                            bytes = summary.bytes,
                            "Connection finished"
                        ),
                        Err(e) => warn!(error = %e, "Connection dropped"),
                    }
                }
                .instrument(span),
            );
        }
    }
}

/// Serve the echo protocol on an existing listener
pub async fn serve(listener: TcpListener, config: ChannelConfig) -> EchoResult<()> {
    EchoServer::from_listener(listener, config).run().await
}

/// Run the echo loop for one transport
///
/// Ends cleanly when the peer closes; any channel error ends the loop and
/// is returned after the channel is closed.
pub async fn handle_connection<T>(
    transport: T,
    config: ChannelConfig,
) -> ChannelResult<ConnectionSummary>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut channel = SecureChannel::open_with_config(transport, config).await?;
    debug!("Secure channel open");

    let mut buf = vec![0u8; config.max_plaintext()];
    let mut summary = ConnectionSummary::default();

    let result = loop {
        let n = match channel.read(&mut buf).await {
            Ok(Some(n)) => n,
            Ok(None) => break Ok(summary),
            Err(e) => break Err(e),
        };

        // Empty messages are consumed without a reply
        if n == 0 {
            continue;
        }

        if let Err(e) = channel.write(&buf[..n]).await {
            break Err(e);
        }
        summary.messages += 1;
        summary.bytes += n as u64;
    };

    if let Err(e) = channel.close().await {
        debug!(error = %e, "Close after echo loop failed");
    }
    result
}
