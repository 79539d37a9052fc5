//! Box Crypto - Public-key authenticated encryption for Saltpipe
//!
//! Provides X25519 key agreement with NaCl box (XSalsa20-Poly1305) sealing
//! under random 24-byte nonces.

mod error;
mod keys;
mod nonce;

pub use error::*;
pub use keys::*;
pub use nonce::*;

pub use wire_protocol::{BOX_OVERHEAD, NONCE_SIZE, PUBLIC_KEY_SIZE, SHARED_KEY_SIZE};
