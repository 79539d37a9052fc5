//! Per-frame nonces drawn from the OS entropy source

use rand::RngCore;
use rand::rngs::OsRng;

use crate::{CryptoError, CryptoResult, NONCE_SIZE};

/// 24-byte nonce carried in the clear at the head of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh nonce from the OS entropy source
    pub fn fresh() -> CryptoResult<Self> {
        OsNonceSource.fresh()
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; NONCE_SIZE] {
        self.0
    }
}

/// Source of nonces for outbound frames
///
/// Random 24-byte values make collisions negligible under one key, so no
/// counter state is kept and both peers can seal independently.
pub trait NonceSource: Send + Sync {
    /// Produce a nonce never used before under the current key
    fn fresh(&self) -> CryptoResult<Nonce>;
}

/// Nonce source backed by the operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn fresh(&self) -> CryptoResult<Nonce> {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;
        Ok(Nonce(bytes))
    }
}
