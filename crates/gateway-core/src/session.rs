//! Session and plugin-handle lifecycle
//!
//! ```text
//! Disconnected ──► Connected ──► SessionCreated ──► HandleAttached
//!       ▲              │               │                  │
//!       └──────────────┴───── reset ───┴──────────────────┘
//! ```
//!
//! No SIP-scoped request may leave the client before both ids exist.

use crate::error::{GatewayError, GatewayResult};

/// Bootstrap progress of one control-channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No control channel
    #[default]
    Disconnected,
    /// Channel open, session not yet created
    Connected,
    /// Session id assigned
    SessionCreated,
    /// SIP plugin handle attached; SIP requests may flow
    HandleAttached,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::SessionCreated => "session created",
            SessionState::HandleAttached => "ready",
        };
        f.write_str(text)
    }
}

/// Session id, handle id and the state derived from them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLifecycle {
    state: SessionState,
    session_id: Option<u64>,
    handle_id: Option<u64>,
}

impl SessionLifecycle {
    /// Fresh, disconnected lifecycle
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Gateway session id
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// SIP plugin handle id
    pub fn handle_id(&self) -> Option<u64> {
        self.handle_id
    }

    /// Both ids, once the handle is attached
    pub fn scope(&self) -> Option<(u64, u64)> {
        match (self.state, self.session_id, self.handle_id) {
            (SessionState::HandleAttached, Some(session), Some(handle)) => Some((session, handle)),
            _ => None,
        }
    }

    /// Whether bootstrap has finished
    pub fn is_ready(&self) -> bool {
        self.scope().is_some()
    }

    /// The control channel came up
    pub fn on_connected(&mut self) -> GatewayResult<()> {
        if self.state != SessionState::Disconnected {
            return Err(GatewayError::invalid_state(format!(
                "channel opened while {}",
                self.state
            )));
        }
        self.state = SessionState::Connected;
        Ok(())
    }

    /// `create` succeeded
    pub fn on_session_created(&mut self, session_id: u64) -> GatewayResult<()> {
        if self.state != SessionState::Connected {
            return Err(GatewayError::protocol(format!(
                "session-create acknowledgment while {}",
                self.state
            )));
        }
        self.session_id = Some(session_id);
        self.state = SessionState::SessionCreated;
        Ok(())
    }

    /// `attach` succeeded
    pub fn on_handle_attached(&mut self, handle_id: u64) -> GatewayResult<()> {
        if self.state != SessionState::SessionCreated {
            return Err(GatewayError::protocol(format!(
                "handle-attach acknowledgment while {}",
                self.state
            )));
        }
        self.handle_id = Some(handle_id);
        self.state = SessionState::HandleAttached;
        Ok(())
    }

    /// Forget both ids
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_order() {
        let mut lifecycle = SessionLifecycle::new();
        assert!(lifecycle.scope().is_none());

        lifecycle.on_connected().unwrap();
        assert!(lifecycle.on_handle_attached(9).is_err());

        lifecycle.on_session_created(100).unwrap();
        assert_eq!(lifecycle.session_id(), Some(100));
        assert!(!lifecycle.is_ready());

        lifecycle.on_handle_attached(200).unwrap();
        assert_eq!(lifecycle.scope(), Some((100, 200)));
        assert_eq!(lifecycle.state().to_string(), "ready");
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_connected().unwrap();
        lifecycle.on_session_created(1).unwrap();
        lifecycle.reset();

        assert_eq!(lifecycle, SessionLifecycle::new());
        assert!(lifecycle.on_session_created(2).is_err());
    }
}
