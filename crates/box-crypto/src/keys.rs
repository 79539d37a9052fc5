//! Key agreement and sealing with the NaCl box construction
//!
//! X25519 agreement, HSalsa20 key derivation and XSalsa20-Poly1305 sealing,
//! wire compatible with `crypto_box_afternm` peers.

use std::fmt;
use std::sync::Arc;

use crypto_box::{
    SalsaBox,
    aead::{Aead, generic_array::GenericArray},
};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{BOX_OVERHEAD, CryptoError, CryptoResult, Nonce, PUBLIC_KEY_SIZE, SHARED_KEY_SIZE};

/// Key pair generated per connection
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair from the OS entropy source
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = Zeroizing::new([0u8; SHARED_KEY_SIZE]);
        OsRng
            .try_fill_bytes(&mut bytes[..])
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;

        Ok(Self::from_secret_bytes(*bytes))
    }

    /// Rebuild a key pair from raw private key bytes
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Derive the shared key with a peer
    ///
    /// Fails with [`CryptoError::InvalidPublicKey`] when the peer key is a
    /// low-order point, since the result would not depend on our secret.
    pub fn precompute(&self, their_public: &[u8; PUBLIC_KEY_SIZE]) -> CryptoResult<SharedKey> {
        let their_public = PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);

        if !shared.was_contributory() {
            debug!("Rejecting non-contributory peer public key");
            return Err(CryptoError::InvalidPublicKey);
        }

        let secret = Zeroizing::new(self.secret.to_bytes());
        let salsa_box = SalsaBox::new(
            &crypto_box::PublicKey::from(*their_public.as_bytes()),
            &crypto_box::SecretKey::from(*secret),
        );
        Ok(SharedKey {
            salsa_box: Arc::new(salsa_box),
        })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

/// Precomputed box key shared by both ends of a session
///
/// The same key seals in both directions; the per-frame random nonce keeps
/// the two directions from colliding.
#[derive(Clone)]
pub struct SharedKey {
    salsa_box: Arc<SalsaBox>,
}

impl SharedKey {
    /// Seal a plaintext
    ///
    /// Returns: [16-byte auth tag][ciphertext], the NaCl box layout
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let sealed = self
            .salsa_box
            .encrypt(GenericArray::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        debug_assert_eq!(sealed.len(), plaintext.len() + BOX_OVERHEAD);
        Ok(sealed)
    }

    /// Verify and open a sealed body
    pub fn open(&self, nonce: &Nonce, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < BOX_OVERHEAD {
            return Err(CryptoError::AuthFailure);
        }

        self.salsa_box
            .decrypt(GenericArray::from_slice(nonce.as_bytes()), sealed)
            .map_err(|_| CryptoError::AuthFailure)
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}
