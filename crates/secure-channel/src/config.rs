//! Channel configuration

use wire_protocol::{BOX_OVERHEAD, MAX_PLAINTEXT, MAX_PLAINTEXT_LIMIT};

use crate::{ChannelError, ChannelResult};

/// Channel configuration
///
/// Both peers of a connection must use the same limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Largest plaintext accepted by `write` and expected from the peer
    max_plaintext: usize,
}

impl ChannelConfig {
    pub fn new(max_plaintext: usize) -> ChannelResult<Self> {
        if max_plaintext == 0 || max_plaintext > MAX_PLAINTEXT_LIMIT {
            return Err(ChannelError::InvalidConfig(format!(
                "max plaintext must be between 1 and {MAX_PLAINTEXT_LIMIT}, got {max_plaintext}"
            )));
        }
        Ok(Self { max_plaintext })
    }

    pub fn max_plaintext(&self) -> usize {
        self.max_plaintext
    }

    /// Largest body length a frame may announce
    pub fn max_sealed_body(&self) -> usize {
        self.max_plaintext + BOX_OVERHEAD
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_plaintext: MAX_PLAINTEXT,
        }
    }
}
