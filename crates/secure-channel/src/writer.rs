//! Encrypting half of a channel

use std::sync::Arc;

use box_crypto::{KeyPair, NonceSource, OsNonceSource, SharedKey};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use wire_protocol::{PUBLIC_KEY_SIZE, SessionState};

use crate::session::Session;
use crate::{ChannelConfig, ChannelError, ChannelResult, framer};

/// Seals messages and writes them to a transport, one frame per message
///
/// A writer is not meant to be shared by concurrent callers; each `write`
/// needs exclusive access until its frame is fully on the transport.
pub struct SecureWriter<W> {
    inner: W,
    key: SharedKey,
    max_plaintext: usize,
    nonces: Arc<dyn NonceSource>,
    session: Arc<Session>,
    shut_down: bool,
}

impl<W> SecureWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap a writer with keys agreed out of band
    pub fn new(
        inner: W,
        keys: &KeyPair,
        peer_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> ChannelResult<Self> {
        Self::with_config(inner, keys, peer_public, ChannelConfig::default())
    }

    pub fn with_config(
        inner: W,
        keys: &KeyPair,
        peer_public: &[u8; PUBLIC_KEY_SIZE],
        config: ChannelConfig,
    ) -> ChannelResult<Self> {
        let key = keys.precompute(peer_public)?;
        Ok(Self::from_parts(inner, key, config, Session::established()))
    }

    pub(crate) fn from_parts(
        inner: W,
        key: SharedKey,
        config: ChannelConfig,
        session: Arc<Session>,
    ) -> Self {
        Self {
            inner,
            key,
            max_plaintext: config.max_plaintext(),
            nonces: Arc::new(OsNonceSource),
            session,
            shut_down: false,
        }
    }

    /// Replace the nonce source used for outbound frames
    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }

    /// Seal `plaintext` and send it as one frame
    ///
    /// Returns the plaintext length. An oversized message is rejected
    /// without affecting the channel.
    pub async fn write(&mut self, plaintext: &[u8]) -> ChannelResult<usize> {
        self.session.check()?;

        if plaintext.len() > self.max_plaintext {
            return Err(ChannelError::MessageTooLarge {
                size: plaintext.len(),
                max: self.max_plaintext,
            });
        }

        let nonce = self
            .nonces
            .fresh()
            .map_err(|e| self.session.poison(e.into()))?;
        let sealed = self
            .key
            .seal(&nonce, plaintext)
            .map_err(|e| self.session.poison(e.into()))?;

        framer::write_frame(&mut self.inner, &nonce, &sealed)
            .await
            .map_err(|e| self.session.poison(e))?;

        Ok(plaintext.len())
    }

    /// Mark the session closed and shut down the transport
    ///
    /// Only the first call touches the transport; later calls return `Ok`.
    pub async fn close(&mut self) -> ChannelResult<()> {
        self.session.close();

        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
