//! Box crypto error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Entropy unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Authentication failed: tampered frame or wrong key")]
    AuthFailure,

    #[error("Invalid public key: key agreement was not contributory")]
    InvalidPublicKey,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
