//! Wire Protocol Definitions for Saltpipe
//!
//! This crate contains the on-wire frame layout, size limits and the
//! session state machine shared by the crypto, channel and echo crates.

mod error;
mod frame;
mod session;

pub use error::*;
pub use frame::*;
pub use session::*;

/// Nonce size carried at the head of every frame (192 bits / 24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Size of the little-endian body length field
pub const LENGTH_SIZE: usize = 2;

/// Fixed frame header: nonce followed by body length
pub const HEADER_SIZE: usize = NONCE_SIZE + LENGTH_SIZE;

/// Public key size exchanged during the handshake (256 bits / 32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Shared key size derived from the key exchange (256 bits / 32 bytes)
pub const SHARED_KEY_SIZE: usize = 32;

/// Authenticator tag appended to every sealed body (128 bits / 16 bytes)
pub const BOX_OVERHEAD: usize = 16;

/// Default largest plaintext accepted by a channel (32 KiB)
pub const MAX_PLAINTEXT: usize = 32 * 1024;

/// Largest sealed body the 16-bit length field can describe
pub const MAX_SEALED_BODY: usize = u16::MAX as usize;

/// Upper bound for a configured plaintext limit
pub const MAX_PLAINTEXT_LIMIT: usize = MAX_SEALED_BODY - BOX_OVERHEAD;
