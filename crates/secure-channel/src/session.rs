//! Session state shared by the reader and writer halves

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use wire_protocol::SessionState;

use crate::{ChannelError, ChannelResult};

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    /// First fatal error, replayed until close
    error: Option<ChannelError>,
}

/// Lifecycle and sticky error of one channel
#[derive(Debug, Default)]
pub(crate) struct Session {
    inner: Mutex<Inner>,
}

impl Session {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Session for halves keyed directly, without a handshake
    pub(crate) fn established() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: SessionState::Established,
                error: None,
            }),
        })
    }

    pub(crate) fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub(crate) fn advance(&self, next: SessionState) -> ChannelResult<()> {
        let mut inner = self.inner.lock();
        inner.state = inner.state.transition(next)?;
        debug!(state = ?next, "Session state changed");
        Ok(())
    }

    /// Fail unless reads and writes are currently allowed
    pub(crate) fn check(&self) -> ChannelResult<()> {
        let inner = self.inner.lock();
        match inner.state {
            SessionState::Established => Ok(()),
            SessionState::Poisoned => Err(inner.error.clone().unwrap_or(ChannelError::Closed)),
            _ => Err(ChannelError::Closed),
        }
    }

    /// Record a failure and hand it back to the caller
    ///
    /// Only the first sticky error is kept; non-sticky errors pass through.
    pub(crate) fn poison(&self, err: ChannelError) -> ChannelError {
        if !err.is_sticky() {
            return err;
        }

        let mut inner = self.inner.lock();
        if inner.state.can_transition_to(SessionState::Poisoned) {
            warn!(error = %err, "Channel poisoned");
            inner.state = SessionState::Poisoned;
            inner.error = Some(err.clone());
        }
        err
    }

    /// Record a clean close by the peer
    ///
    /// A poisoned session stays poisoned and keeps replaying its error.
    pub(crate) fn peer_closed(&self) -> ChannelResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Established => {
                inner.state = SessionState::Closed;
                debug!("Peer closed the channel");
                Ok(())
            }
            SessionState::Poisoned => Err(inner.error.clone().unwrap_or(ChannelError::Closed)),
            _ => Err(ChannelError::Closed),
        }
    }

    /// Move to closed; returns false if already closed
    pub(crate) fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.can_transition_to(SessionState::Closed) {
            inner.state = SessionState::Closed;
            inner.error = None;
            true
        } else {
            false
        }
    }
}
