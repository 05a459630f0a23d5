//! SIP registration through the gateway
//!
//! ```text
//! Unregistered ──register──► Registering ──registered──────────► Registered
//!      ▲                         │                                   │
//!      │                         └─registration_failed──► Failed     │
//!      │                                                    │        │
//!      ├──────────────── register (retry) ◄─────────────────┘        │
//!      └──────────────── unregister / transport reset ◄──────────────┘
//! ```
//!
//! Unregistering is optimistic: the state moves to `Unregistered` as soon as the
//! request is sent, without waiting for the gateway's `unregistered` event.
//!
//! # Usage Examples
//!
//! ```rust
//! use rvoip_gateway_core::registration::RegistrationRequest;
//!
//! let request = RegistrationRequest::new("alice@example.com")
//!     .with_secret("s3cr3t")
//!     .with_display_name("Alice")
//!     .with_proxy("proxy.example:5060");
//!
//! assert_eq!(request.identity, "alice@example.com");
//! assert_eq!(request.proxy.as_deref(), Some("proxy.example:5060"));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{normalize_sip_uri, SipRequest};

/// Parameters of a `register` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Public identity, with or without the `sip:` scheme
    pub identity: String,

    /// Digest secret
    ///
    /// Kept in memory for the lifetime of the request only and never logged.
    pub secret: Option<String>,

    /// Display name for outgoing requests
    pub display_name: Option<String>,

    /// Registrar / outbound proxy, with or without the `sip:` scheme
    pub proxy: Option<String>,
}

impl RegistrationRequest {
    /// Registration for `identity` without credentials
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: None,
            display_name: None,
            proxy: None,
        }
    }

    /// Set the digest secret
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the registrar / outbound proxy
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// The SIP plugin body for this request
    pub fn to_sip_request(&self) -> SipRequest {
        SipRequest::Register {
            username: normalize_sip_uri(&self.identity),
            secret: self.secret.clone(),
            display_name: self.display_name.clone(),
            proxy: self.proxy.as_deref().map(normalize_sip_uri),
        }
    }
}

/// Registration status of the client's single identity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegistrationState {
    /// No binding
    #[default]
    Unregistered,
    /// `register` sent
    Registering,
    /// Binding accepted
    Registered,
    /// Binding refused; `register` may be retried
    Failed {
        /// SIP or gateway error code
        code: Option<u16>,
        /// Reason text
        reason: String,
    },
}

impl RegistrationState {
    /// Whether calls may be placed
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Registered)
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationState::Unregistered => write!(f, "unregistered"),
            RegistrationState::Registering => write!(f, "registering"),
            RegistrationState::Registered => write!(f, "registered"),
            RegistrationState::Failed { code: Some(code), reason } => {
                write!(f, "registration failed: {} {}", code, reason)
            }
            RegistrationState::Failed { code: None, reason } => {
                write!(f, "registration failed: {}", reason)
            }
        }
    }
}

/// Registration state machine
#[derive(Debug, Clone, Default)]
pub struct Registration {
    state: RegistrationState,
    identity: Option<String>,
}

impl Registration {
    /// Fresh, unregistered machine
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    /// Identity of the last `register`
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Validate and start a registration, returning the body to send
    ///
    /// Allowed from `Unregistered` and `Failed`, and only once the plugin handle is
    /// attached.
    pub fn begin(&mut self, request: &RegistrationRequest, handle_attached: bool) -> GatewayResult<SipRequest> {
        if !handle_attached {
            return Err(GatewayError::invalid_state(
                "cannot register before the SIP plugin handle is attached",
            ));
        }
        match self.state {
            RegistrationState::Unregistered | RegistrationState::Failed { .. } => {}
            RegistrationState::Registering => {
                return Err(GatewayError::invalid_state("a registration is already in progress"));
            }
            RegistrationState::Registered => {
                return Err(GatewayError::invalid_state("already registered"));
            }
        }
        if request.identity.trim().is_empty() {
            return Err(GatewayError::config("registration identity is empty"));
        }

        let body = request.to_sip_request();
        self.identity = Some(normalize_sip_uri(&request.identity));
        self.state = RegistrationState::Registering;
        Ok(body)
    }

    /// `registered` event; returns whether the state changed
    pub fn on_registered(&mut self) -> bool {
        if self.state == RegistrationState::Registering {
            self.state = RegistrationState::Registered;
            true
        } else {
            false
        }
    }

    /// `registration_failed` event or a correlated error; returns whether the state changed
    pub fn on_failed(&mut self, code: Option<u16>, reason: impl Into<String>) -> bool {
        match self.state {
            RegistrationState::Registering | RegistrationState::Registered => {
                self.state = RegistrationState::Failed {
                    code,
                    reason: reason.into(),
                };
                true
            }
            _ => false,
        }
    }

    /// Validate and perform an optimistic unregister, returning the body to send
    pub fn begin_unregister(&mut self) -> GatewayResult<SipRequest> {
        if !self.state.is_registered() {
            return Err(GatewayError::invalid_state(format!(
                "cannot unregister while {}",
                self.state
            )));
        }
        self.state = RegistrationState::Unregistered;
        Ok(SipRequest::Unregister)
    }

    /// Back to `Unregistered`
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
