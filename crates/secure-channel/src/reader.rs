//! Decrypting half of a channel

use std::sync::Arc;

use box_crypto::{KeyPair, SharedKey};
use bytes::Bytes;
use tokio::io::AsyncRead;
use wire_protocol::{PUBLIC_KEY_SIZE, SessionState};

use crate::session::Session;
use crate::{ChannelConfig, ChannelResult, framer};

/// Reads frames from a transport and yields the decrypted messages
///
/// Each successful read corresponds to exactly one frame sent by the peer.
pub struct SecureReader<R> {
    inner: R,
    key: SharedKey,
    max_body: usize,
    session: Arc<Session>,
}

impl<R> SecureReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a reader with keys agreed out of band
    pub fn new(
        inner: R,
        keys: &KeyPair,
        peer_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> ChannelResult<Self> {
        Self::with_config(inner, keys, peer_public, ChannelConfig::default())
    }

    pub fn with_config(
        inner: R,
        keys: &KeyPair,
        peer_public: &[u8; PUBLIC_KEY_SIZE],
        config: ChannelConfig,
    ) -> ChannelResult<Self> {
        let key = keys.precompute(peer_public)?;
        Ok(Self::from_parts(inner, key, config, Session::established()))
    }

    pub(crate) fn from_parts(
        inner: R,
        key: SharedKey,
        config: ChannelConfig,
        session: Arc<Session>,
    ) -> Self {
        Self {
            inner,
            key,
            max_body: config.max_sealed_body(),
            session,
        }
    }

    /// Read one message into `buf`
    ///
    /// Returns `Ok(None)` once the peer has closed the transport. Bytes of
    /// the message beyond `buf.len()` are discarded, so callers should size
    /// `buf` to the configured plaintext limit.
    pub async fn read(&mut self, buf: &mut [u8]) -> ChannelResult<Option<usize>> {
        let Some(message) = self.next_message().await? else {
            return Ok(None);
        };

        let n = message.len().min(buf.len());
        buf[..n].copy_from_slice(&message[..n]);
        Ok(Some(n))
    }

    /// Read one whole message
    pub async fn recv(&mut self) -> ChannelResult<Option<Bytes>> {
        Ok(self.next_message().await?.map(Bytes::from))
    }

    async fn next_message(&mut self) -> ChannelResult<Option<Vec<u8>>> {
        self.session.check()?;

        let frame = match framer::read_frame(&mut self.inner, self.max_body).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.session.peer_closed()?;
                return Ok(None);
            }
            Err(e) => return Err(self.session.poison(e)),
        };

        let message = self
            .key
            .open(&frame.nonce, &frame.sealed)
            .map_err(|e| self.session.poison(e.into()))?;

        // The other half may have poisoned or closed the session mid-read
        self.session.check()?;
        Ok(Some(message))
    }

    /// Mark the session closed; the transport is released on drop
    pub fn close(&mut self) {
        self.session.close();
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }
}
