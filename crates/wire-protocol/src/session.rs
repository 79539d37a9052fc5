//! Session lifecycle states

use crate::{ProtocolError, ProtocolResult};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport bound, nothing sent yet
    Created,
    /// Public keys are being exchanged
    Handshaking,
    /// Keys agreed; reads and writes are allowed
    Established,
    /// A fatal error occurred; every operation repeats it until close
    Poisoned,
    /// Session ended locally or by the peer
    Closed,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Created, Handshaking)
                | (Handshaking, Established)
                | (Handshaking, Closed)
                | (Established, Poisoned)
                | (Established, Closed)
                | (Poisoned, Closed)
        )
    }

    /// Validate and return the next state
    pub fn transition(self, next: SessionState) -> ProtocolResult<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ProtocolError::InvalidStateTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Reads and writes may only succeed while established
    pub fn is_established(self) -> bool {
        matches!(self, SessionState::Established)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Created
    }
}
