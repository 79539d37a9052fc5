//! Handshake and the bidirectional secure channel

use bytes::Bytes;
use box_crypto::KeyPair;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};
use wire_protocol::{PUBLIC_KEY_SIZE, SessionState};

use crate::session::Session;
use crate::{ChannelConfig, ChannelError, ChannelResult, SecureReader, SecureWriter};

/// Encrypted, message-oriented channel over a reliable byte transport
///
/// Both peers call [`SecureChannel::open`]; there is no client or server
/// role. Each side sends its 32-byte ephemeral public key, then reads the
/// peer's, so either side may go first.
pub struct SecureChannel<T> {
    reader: SecureReader<ReadHalf<T>>,
    writer: SecureWriter<WriteHalf<T>>,
    local_public: [u8; PUBLIC_KEY_SIZE],
    peer_public: [u8; PUBLIC_KEY_SIZE],
}

impl<T> SecureChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the handshake with default limits
    pub async fn open(transport: T) -> ChannelResult<Self> {
        Self::open_with_config(transport, ChannelConfig::default()).await
    }

    pub async fn open_with_config(mut transport: T, config: ChannelConfig) -> ChannelResult<Self> {
        let session = Session::new();
        session.advance(SessionState::Handshaking)?;

        let keys = match KeyPair::generate() {
            Ok(keys) => keys,
            Err(e) => {
                session.close();
                return Err(ChannelError::handshake(e));
            }
        };

        let (key, peer_public) = match handshake(&mut transport, &keys).await {
            Ok(agreed) => agreed,
            Err(e) => {
                session.close();
                return Err(e);
            }
        };
        let local_public = keys.public_key_bytes();
        drop(keys);

        session.advance(SessionState::Established)?;
        debug!("Handshake complete");

        let (read_half, write_half) = tokio::io::split(transport);
        Ok(Self {
            reader: SecureReader::from_parts(read_half, key.clone(), config, session.clone()),
            writer: SecureWriter::from_parts(write_half, key, config, session),
            local_public,
            peer_public,
        })
    }

    /// Read one message into `buf`; `Ok(None)` means the peer closed
    pub async fn read(&mut self, buf: &mut [u8]) -> ChannelResult<Option<usize>> {
        self.reader.read(buf).await
    }

    /// Read one whole message; `Ok(None)` means the peer closed
    pub async fn recv(&mut self) -> ChannelResult<Option<Bytes>> {
        self.reader.recv().await
    }

    /// Send one message
    pub async fn write(&mut self, plaintext: &[u8]) -> ChannelResult<usize> {
        self.writer.write(plaintext).await
    }

    /// Close the channel and shut down the transport; idempotent
    pub async fn close(&mut self) -> ChannelResult<()> {
        self.writer.close().await
    }

    pub fn state(&self) -> SessionState {
        self.reader.state()
    }

    pub fn local_public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.local_public
    }

    pub fn peer_public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.peer_public
    }

    /// Split into halves that can be driven from separate tasks
    ///
    /// The halves share one session, so an error on either side poisons both.
    pub fn into_split(self) -> (SecureReader<ReadHalf<T>>, SecureWriter<WriteHalf<T>>) {
        (self.reader, self.writer)
    }
}

impl SecureChannel<TcpStream> {
    /// Connect over TCP and run the handshake
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> ChannelResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let peer = stream.peer_addr()?;
        let channel = Self::open(stream).await?;
        info!(%peer, "Secure channel established");

        Ok(channel)
    }
}

/// Send our public key, then read the peer's and derive the shared key
async fn handshake<T>(
    transport: &mut T,
    keys: &KeyPair,
) -> ChannelResult<(box_crypto::SharedKey, [u8; PUBLIC_KEY_SIZE])>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    transport
        .write_all(&keys.public_key_bytes())
        .await
        .map_err(ChannelError::handshake)?;
    transport.flush().await.map_err(ChannelError::handshake)?;

    let mut peer_public = [0u8; PUBLIC_KEY_SIZE];
    transport
        .read_exact(&mut peer_public)
        .await
        .map_err(ChannelError::handshake)?;

    let key = keys.precompute(&peer_public).map_err(ChannelError::handshake)?;
    Ok((key, peer_public))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use box_crypto::{CryptoError, CryptoResult, Nonce, NonceSource};
    use rand::RngCore;
    use tokio::io::DuplexStream;
    use wire_protocol::{BOX_OVERHEAD, FrameHeader, HEADER_SIZE, MAX_PLAINTEXT, NONCE_SIZE};

    use super::*;

    async fn channel_pair() -> (SecureChannel<DuplexStream>, SecureChannel<DuplexStream>) {
        let (a, b) = tokio::io::duplex(128 * 1024);
        tokio::try_join!(SecureChannel::open(a), SecureChannel::open(b)).unwrap()
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut buf);
        buf
    }

    /// Keyed halves writing into a buffer, plus the keys to read it back
    fn keyed_writer() -> (SecureWriter<Vec<u8>>, KeyPair, [u8; PUBLIC_KEY_SIZE]) {
        let sender = KeyPair::generate().unwrap();
        let receiver = KeyPair::generate().unwrap();
        let writer = SecureWriter::new(Vec::new(), &sender, &receiver.public_key_bytes()).unwrap();
        let sender_public = sender.public_key_bytes();
        (writer, receiver, sender_public)
    }

    #[tokio::test]
    async fn test_hello_world_round_trip() {
        let (mut client, mut server) = channel_pair().await;
        assert_eq!(client.peer_public_key(), server.local_public_key());
        assert_eq!(server.peer_public_key(), client.local_public_key());

        assert_eq!(client.write(b"hello world").await.unwrap(), 11);

        let mut buf = vec![0u8; MAX_PLAINTEXT];
        let n = server.read(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[tokio::test]
    async fn test_empty_message_is_not_eof() {
        let (mut client, mut server) = channel_pair().await;

        client.write(b"").await.unwrap();

        let mut buf = vec![0u8; MAX_PLAINTEXT];
        assert_eq!(server.read(&mut buf).await.unwrap(), Some(0));
        assert_eq!(server.state(), SessionState::Established);
    }

    #[tokio::test]
    async fn test_max_plaintext_round_trip() {
        let (mut client, mut server) = channel_pair().await;
        let message = random_bytes(MAX_PLAINTEXT);

        client.write(&message).await.unwrap();

        let received = server.recv().await.unwrap().unwrap();
        assert_eq!(received.as_ref(), message.as_slice());
    }

    #[tokio::test]
    async fn test_oversized_message_does_not_poison() {
        let (mut client, mut server) = channel_pair().await;

        let err = client.write(&random_bytes(MAX_PLAINTEXT + 1)).await.unwrap_err();
        assert_eq!(
            err,
            ChannelError::MessageTooLarge {
                size: MAX_PLAINTEXT + 1,
                max: MAX_PLAINTEXT
            }
        );
        assert_eq!(client.state(), SessionState::Established);

        let message = random_bytes(16);
        client.write(&message).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), message);
    }

    #[tokio::test]
    async fn test_bidirectional_ordering() {
        let (mut client, mut server) = channel_pair().await;

        for i in 0..50u32 {
            client.write(format!("ping {i}").as_bytes()).await.unwrap();
        }
        for i in 0..50u32 {
            let got = server.recv().await.unwrap().unwrap();
            assert_eq!(got, format!("ping {i}").as_bytes());
            server.write(&got).await.unwrap();
        }
        for i in 0..50u32 {
            assert_eq!(
                client.recv().await.unwrap().unwrap(),
                format!("ping {i}").as_bytes()
            );
        }
    }

    #[tokio::test]
    async fn test_wire_does_not_contain_plaintext() {
        let (mut writer, _, _) = keyed_writer();
        let message = random_bytes(64);

        writer.write(&message).await.unwrap();
        writer.write(b"hello world\n").await.unwrap();

        let wire = writer.into_inner();
        assert_eq!(wire.len(), 2 * HEADER_SIZE + 64 + 12 + 2 * BOX_OVERHEAD);
        assert!(!wire.windows(message.len()).any(|w| w == message.as_slice()));
        assert!(!wire.windows(12).any(|w| w == b"hello world\n"));
    }

    #[tokio::test]
    async fn test_nonces_unique_across_writes() {
        let (mut writer, _, _) = keyed_writer();
        let count = 10_000;

        for _ in 0..count {
            writer.write(b"x").await.unwrap();
        }

        let wire = writer.into_inner();
        let mut nonces = HashSet::new();
        let mut rest = wire.as_slice();
        while !rest.is_empty() {
            let header = FrameHeader::decode(rest).unwrap();
            assert_eq!(header.body_len as usize, 1 + BOX_OVERHEAD);
            nonces.insert(header.nonce);
            rest = &rest[header.frame_len()..];
        }
        assert_eq!(nonces.len(), count);
    }

    #[tokio::test]
    async fn test_any_ciphertext_bit_flip_is_rejected() {
        let (mut writer, receiver, sender_public) = keyed_writer();
        writer.write(b"attack at dawn").await.unwrap();
        let wire = writer.into_inner();

        for offset in HEADER_SIZE..wire.len() {
            for bit in [0x01u8, 0x80] {
                let mut tampered = wire.clone();
                tampered[offset] ^= bit;

                let mut reader =
                    SecureReader::new(tampered.as_slice(), &receiver, &sender_public).unwrap();
                let mut buf = [0u8; 64];
                assert_eq!(reader.read(&mut buf).await, Err(ChannelError::AuthFailure));
                assert_eq!(reader.state(), SessionState::Poisoned);
                // Sticky until close
                assert_eq!(reader.read(&mut buf).await, Err(ChannelError::AuthFailure));
            }
        }
    }

    #[tokio::test]
    async fn test_nonce_tamper_is_rejected() {
        let (mut writer, receiver, sender_public) = keyed_writer();
        writer.write(b"attack at dawn").await.unwrap();
        let mut wire = writer.into_inner();
        wire[3] ^= 0x10;

        let mut reader = SecureReader::new(wire.as_slice(), &receiver, &sender_public).unwrap();
        assert_eq!(reader.recv().await, Err(ChannelError::AuthFailure));
    }

    #[tokio::test]
    async fn test_wrong_peer_key() {
        let (mut writer, receiver, _) = keyed_writer();
        writer.write(b"for the receiver").await.unwrap();
        let wire = writer.into_inner();

        let impostor = KeyPair::generate().unwrap();
        let mut reader =
            SecureReader::new(wire.as_slice(), &receiver, &impostor.public_key_bytes()).unwrap();
        assert_eq!(reader.recv().await, Err(ChannelError::AuthFailure));
    }

    #[tokio::test]
    async fn test_small_buffer_truncates_message() {
        let (mut writer, receiver, sender_public) = keyed_writer();
        writer.write(b"0123456789").await.unwrap();
        writer.write(b"next").await.unwrap();
        let wire = writer.into_inner();

        let mut reader = SecureReader::new(wire.as_slice(), &receiver, &sender_public).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).await.unwrap(), Some(4));
        assert_eq!(&buf, b"0123");

        // The remainder of the first message is gone
        assert_eq!(reader.read(&mut buf).await.unwrap(), Some(4));
        assert_eq!(&buf, b"next");
    }

    #[tokio::test]
    async fn test_oversized_frame_poisons_reader() {
        let receiver = KeyPair::generate().unwrap();
        let sender = KeyPair::generate().unwrap();

        let mut wire = vec![0u8; NONCE_SIZE];
        let announced = MAX_PLAINTEXT + BOX_OVERHEAD + 1;
        wire.extend_from_slice(&(announced as u16).to_le_bytes());
        wire.extend_from_slice(&vec![0u8; announced]);

        let mut reader =
            SecureReader::new(wire.as_slice(), &receiver, &sender.public_key_bytes()).unwrap();
        let expected = ChannelError::FrameTooLarge {
            size: announced,
            max: MAX_PLAINTEXT + BOX_OVERHEAD,
        };
        assert_eq!(reader.recv().await, Err(expected.clone()));
        assert_eq!(reader.recv().await, Err(expected));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_unexpected_eof() {
        let (mut writer, receiver, sender_public) = keyed_writer();
        writer.write(b"cut short").await.unwrap();
        let mut wire = writer.into_inner();
        wire.truncate(HEADER_SIZE + 3);

        let mut reader = SecureReader::new(wire.as_slice(), &receiver, &sender_public).unwrap();
        assert_eq!(reader.recv().await, Err(ChannelError::UnexpectedEof));
        assert_eq!(reader.state(), SessionState::Poisoned);
    }

    #[tokio::test]
    async fn test_peer_close_is_eof() {
        let (mut client, mut server) = channel_pair().await;

        client.write(b"last words").await.unwrap();
        client.close().await.unwrap();

        let mut buf = vec![0u8; MAX_PLAINTEXT];
        assert_eq!(server.read(&mut buf).await.unwrap(), Some(10));
        assert_eq!(server.read(&mut buf).await.unwrap(), None);
        assert_eq!(server.state(), SessionState::Closed);
        assert_eq!(server.read(&mut buf).await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (mut client, _server) = channel_pair().await;

        client.close().await.unwrap();
        client.close().await.unwrap();

        assert_eq!(client.state(), SessionState::Closed);
        assert_eq!(client.write(b"too late").await, Err(ChannelError::Closed));
        let mut buf = [0u8; 16];
        assert_eq!(client.read(&mut buf).await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_close_clears_poison() {
        let (mut writer, receiver, sender_public) = keyed_writer();
        writer.write(b"payload").await.unwrap();
        let mut wire = writer.into_inner();
        wire[HEADER_SIZE] ^= 1;

        let mut reader = SecureReader::new(wire.as_slice(), &receiver, &sender_public).unwrap();
        assert_eq!(reader.recv().await, Err(ChannelError::AuthFailure));

        reader.close();
        assert_eq!(reader.recv().await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_short_handshake_fails() {
        let (a, mut b) = tokio::io::duplex(1024);

        let peer = tokio::spawn(async move {
            b.write_all(&[1u8; 10]).await.unwrap();
            drop(b);
        });

        let err = SecureChannel::open(a).await.err().unwrap();
        assert!(matches!(err, ChannelError::HandshakeFailure(_)));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_low_order_peer_key_fails_handshake() {
        let (a, mut b) = tokio::io::duplex(1024);
        b.write_all(&[0u8; PUBLIC_KEY_SIZE]).await.unwrap();

        let err = SecureChannel::open(a).await.err().unwrap();
        assert!(matches!(err, ChannelError::HandshakeFailure(_)));
    }

    struct DrainedEntropy;

    impl NonceSource for DrainedEntropy {
        fn fresh(&self) -> CryptoResult<Nonce> {
            Err(CryptoError::EntropyUnavailable("source drained".into()))
        }
    }

    #[tokio::test]
    async fn test_entropy_failure_poisons_writer() {
        let (writer, _, _) = keyed_writer();
        let mut writer = writer.with_nonce_source(Arc::new(DrainedEntropy));

        let expected = ChannelError::EntropyUnavailable("source drained".into());
        assert_eq!(writer.write(b"data").await, Err(expected.clone()));
        assert_eq!(writer.state(), SessionState::Poisoned);
        assert_eq!(writer.write(b"data").await, Err(expected));
        assert!(writer.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_pending_read_fails_once_writer_is_poisoned() {
        let (mut client, server) = channel_pair().await;
        let (mut server_rx, server_tx) = server.into_split();
        let mut server_tx = server_tx.with_nonce_source(Arc::new(DrainedEntropy));

        let pending = tokio::spawn(async move {
            let result = server_rx.recv().await;
            (result, server_rx.state())
        });

        let expected = ChannelError::EntropyUnavailable("source drained".into());
        assert_eq!(server_tx.write(b"reply").await, Err(expected.clone()));
        client.write(b"arrives after poison").await.unwrap();

        let (result, state) = pending.await.unwrap();
        assert_eq!(result, Err(expected));
        assert_eq!(state, SessionState::Poisoned);
    }

    #[tokio::test]
    async fn test_peer_close_after_poison_keeps_error() {
        let (mut client, server) = channel_pair().await;
        let (mut server_rx, server_tx) = server.into_split();
        let mut server_tx = server_tx.with_nonce_source(Arc::new(DrainedEntropy));

        let pending = tokio::spawn(async move {
            let result = server_rx.recv().await;
            (result, server_rx.state())
        });

        let expected = ChannelError::EntropyUnavailable("source drained".into());
        assert_eq!(server_tx.write(b"reply").await, Err(expected.clone()));
        client.close().await.unwrap();

        let (result, state) = pending.await.unwrap();
        assert_eq!(result, Err(expected));
        assert_eq!(state, SessionState::Poisoned);
    }

    #[tokio::test]
    async fn test_split_halves_run_concurrently() {
        let (client, server) = channel_pair().await;
        let (mut client_rx, mut client_tx) = client.into_split();
        let (mut server_rx, mut server_tx) = server.into_split();

        let echo = tokio::spawn(async move {
            while let Some(message) = server_rx.recv().await.unwrap() {
                server_tx.write(&message).await.unwrap();
            }
            server_tx.close().await.unwrap();
        });

        let sender = tokio::spawn(async move {
            for i in 0..100u32 {
                client_tx.write(&i.to_le_bytes()).await.unwrap();
            }
            client_tx
        });

        for i in 0..100u32 {
            let got = client_rx.recv().await.unwrap().unwrap();
            assert_eq!(got.as_ref(), &i.to_le_bytes());
        }

        // Closing either half ends the shared session
        let mut client_tx = sender.await.unwrap();
        client_tx.close().await.unwrap();
        assert_eq!(client_rx.state(), SessionState::Closed);
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn test_custom_limit_enforced_both_ways() {
        let config = ChannelConfig::new(8).unwrap();
        let (a, b) = tokio::io::duplex(4096);
        let (mut small, mut default) = tokio::try_join!(
            SecureChannel::open_with_config(a, config),
            SecureChannel::open(b)
        )
        .unwrap();

        assert!(matches!(
            small.write(&[0u8; 9]).await,
            Err(ChannelError::MessageTooLarge { size: 9, max: 8 })
        ));

        default.write(&[0u8; 9]).await.unwrap();
        assert_eq!(
            small.recv().await,
            Err(ChannelError::FrameTooLarge {
                size: 9 + BOX_OVERHEAD,
                max: 8 + BOX_OVERHEAD
            })
        );
    }
}
