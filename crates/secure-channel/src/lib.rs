//! Secure Channel - Encrypted message streams for Saltpipe
//!
//! Wraps an ordered, reliable byte transport (TCP, in-memory pipes) with a
//! one-round public-key handshake and length-prefixed sealed frames.
//! Every `write` becomes exactly one frame and every `read` returns exactly
//! one message.

mod channel;
mod config;
mod error;
pub mod framer;
mod reader;
mod session;
mod writer;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use reader::*;
pub use writer::*;

pub use wire_protocol::{MAX_PLAINTEXT, SessionState};
