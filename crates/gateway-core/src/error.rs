//! Error types for the gateway signaling client
//!
//! Errors fall into four families that decide how far a failure travels:
//!
//! - **Transport** (`Connect`, `ConnectTimeout`, `NotConnected`, `Transport`) - fatal to
//!   the whole client, every derived state is reset.
//! - **Protocol** (`Protocol`, `Bootstrap`) - a malformed or unexpected envelope is
//!   dropped; a failed bootstrap step is fatal.
//! - **Registration** (`Registration`) - the gateway refused the REGISTER, the user may
//!   retry.
//! - **Call** (`Call`, `Media`, `Busy`) - the current call ends, registration and
//!   transport are untouched.

use thiserror::Error;

/// Result type for gateway client operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur while talking to the gateway or driving the media engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The control channel could not be opened
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect {
        /// Endpoint that was dialed
        endpoint: String,
        /// Handshake or socket failure
        reason: String,
    },

    /// The control channel handshake did not finish in time
    #[error("Connecting to {endpoint} timed out after {seconds} seconds")]
    ConnectTimeout {
        /// Endpoint that was dialed
        endpoint: String,
        /// Configured timeout
        seconds: u64,
    },

    /// A request was issued before the channel was up or after it closed
    #[error("Not connected to the gateway")]
    NotConnected,

    /// The channel failed after it was established
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },

    /// A frame could not be understood
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the malformed or unexpected content
        message: String,
    },

    /// Session creation or plugin attachment was refused
    #[error("Gateway bootstrap failed: {reason}")]
    Bootstrap {
        /// Gateway error code, when one was reported
        code: Option<u16>,
        /// Gateway reason text
        reason: String,
    },

    /// The gateway reported a registration failure
    #[error("Registration failed: {reason}")]
    Registration {
        /// SIP or gateway error code, when one was reported
        code: Option<u16>,
        /// Reason text
        reason: String,
    },

    /// The gateway reported a call failure
    #[error("Call failed: {reason}")]
    Call {
        /// Reason text
        reason: String,
    },

    /// The media engine failed an offer/answer or ICE operation
    #[error("Media engine error: {message}")]
    Media {
        /// Engine supplied description
        message: String,
    },

    /// A call is already in progress
    #[error("Busy: a call is already in progress, refused call with {peer}")]
    Busy {
        /// Peer of the refused call
        peer: String,
    },

    /// The operation is not valid in the current state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// What was attempted and why it is not allowed
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
    },
}

impl GatewayError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a bootstrap error
    pub fn bootstrap(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Bootstrap {
            code,
            reason: reason.into(),
        }
    }

    /// Create a registration error
    pub fn registration(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Registration {
            code,
            reason: reason.into(),
        }
    }

    /// Create a call error
    pub fn call(reason: impl Into<String>) -> Self {
        Self::Call {
            reason: reason.into(),
        }
    }

    /// Create a media engine error
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Stable category name, used as a structured logging field
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect { .. }
            | Self::ConnectTimeout { .. }
            | Self::NotConnected
            | Self::Transport { .. } => "transport",
            Self::Protocol { .. } | Self::Bootstrap { .. } => "protocol",
            Self::Registration { .. } => "registration",
            Self::Call { .. } | Self::Media { .. } | Self::Busy { .. } => "call",
            Self::InvalidState { .. } => "state",
            Self::Configuration { .. } => "configuration",
        }
    }

    /// Whether the error tears the whole client down
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), "transport") || matches!(self, Self::Bootstrap { .. })
    }

    /// Whether the user can simply try again without reconnecting
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal() && !matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_categories() {
        assert_eq!(GatewayError::NotConnected.category(), "transport");
        assert_eq!(GatewayError::protocol("bad json").category(), "protocol");
        assert_eq!(GatewayError::registration(Some(403), "Forbidden").category(), "registration");
        assert_eq!(GatewayError::Busy { peer: "sip:bob@example.com".into() }.category(), "call");
        assert_eq!(GatewayError::media("no audio track").category(), "call");
    }

    #[test]
    fn test_fatal_versus_recoverable() {
        assert!(GatewayError::transport("reset by peer").is_fatal());
        assert!(GatewayError::bootstrap(Some(458), "Session not found").is_fatal());
        assert!(!GatewayError::protocol("unexpected frame").is_fatal());

        assert!(GatewayError::registration(Some(401), "Unauthorized").is_recoverable());
        assert!(GatewayError::call("486 Busy Here").is_recoverable());
        assert!(!GatewayError::config("empty url").is_recoverable());
        assert!(!GatewayError::NotConnected.is_recoverable());
    }

    #[test]
    fn test_display_carries_gateway_reason() {
        let err = GatewayError::registration(Some(403), "Forbidden");
        assert_eq!(err.to_string(), "Registration failed: Forbidden");

        let err = GatewayError::ConnectTimeout {
            endpoint: "ws://gateway.example:8188".into(),
            seconds: 10,
        };
        assert!(err.to_string().contains("10 seconds"));
    }
}
