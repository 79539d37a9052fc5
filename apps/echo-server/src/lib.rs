//! Saltpipe Echo Service
//!
//! Accepts TCP connections, wraps each in a secure channel and sends every
//! decrypted message straight back under the session keys.

mod client;
mod error;
mod server;

pub use client::*;
pub use error::*;
pub use server::*;
