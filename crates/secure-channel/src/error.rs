//! Channel error types

use box_crypto::CryptoError;
use thiserror::Error;
use wire_protocol::ProtocolError;

/// Secure channel error
///
/// Cloneable so the first fatal error can be replayed on every later call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailure(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Unexpected EOF in the middle of a frame")]
    UnexpectedEof,

    #[error("Authentication failed: tampered frame or wrong key")]
    AuthFailure,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Entropy unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel closed")]
    Closed,
}

impl ChannelError {
    /// Whether this error poisons the channel until it is closed
    pub fn is_sticky(&self) -> bool {
        !matches!(
            self,
            ChannelError::MessageTooLarge { .. }
                | ChannelError::InvalidConfig(_)
                | ChannelError::Closed
        )
    }

    pub(crate) fn handshake(err: impl std::fmt::Display) -> Self {
        ChannelError::HandshakeFailure(err.to_string())
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => ChannelError::UnexpectedEof,
            _ => ChannelError::Transport(err.to_string()),
        }
    }
}

impl From<CryptoError> for ChannelError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthFailure => ChannelError::AuthFailure,
            CryptoError::EntropyUnavailable(reason) => ChannelError::EntropyUnavailable(reason),
            CryptoError::InvalidPublicKey => ChannelError::HandshakeFailure(err.to_string()),
            CryptoError::Encryption => ChannelError::Crypto(err.to_string()),
        }
    }
}

impl From<ProtocolError> for ChannelError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::FrameTooLarge { size, max } => ChannelError::FrameTooLarge { size, max },
            ProtocolError::TruncatedHeader { .. } => ChannelError::UnexpectedEof,
            ProtocolError::InvalidStateTransition { .. } => ChannelError::Closed,
        }
    }
}

pub type ChannelResult<T> = Result<T, ChannelError>;
