//! Client configuration
//!
//! [`GatewayConfig`] carries everything the client needs before the first frame is
//! sent: where the gateway lives, which plugin to attach, the liveness and
//! correlation timers, and the STUN/TURN servers that are handed to the media engine.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        GatewayConfig         │
//! │  url / subprotocol / plugin  │  • control channel
//! │  connect / keepalive /       │  • timers (seconds)
//! │  transaction timeouts        │
//! │  ice_servers                ─┼─ • passed to the media engine
//! └──────────────────────────────┘
//! ```
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```rust
//! use rvoip_gateway_core::config::GatewayConfig;
//!
//! let config = GatewayConfig::from_toml_str(r#"
//!     url = "wss://gateway.example.com/ws"
//!     keepalive_interval_secs = 15
//! "#).unwrap();
//!
//! assert_eq!(config.keepalive_interval_secs, 15);
//! assert_eq!(config.plugin, "janus.plugin.sip");
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Websocket subprotocol spoken by the gateway
pub const DEFAULT_SUBPROTOCOL: &str = "janus-protocol";

/// Gateway plugin that provides the SIP capability
pub const DEFAULT_PLUGIN: &str = "janus.plugin.sip";

/// Idle time after which the gateway drops a session
pub const GATEWAY_SESSION_TIMEOUT_SECS: u64 = 30;

/// A STUN or TURN server offered to the media engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (e.g. "stun:stun.l.google.com:19302")
    pub urls: Vec<String>,
    /// TURN username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less STUN server
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Configuration for a [`GatewayClient`](crate::client::GatewayClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Control channel endpoint (ws:// or wss://)
    pub url: String,

    /// Websocket subprotocol requested during the handshake
    pub subprotocol: String,

    /// Plugin package attached after the session is created
    pub plugin: String,

    /// Upper bound for the websocket handshake
    pub connect_timeout_secs: u64,

    /// Interval between keepalive messages while a session exists
    ///
    /// Must stay below the gateway's session timeout (30 seconds) or the gateway
    /// will reclaim the session between two keepalives.
    pub keepalive_interval_secs: u64,

    /// Time an un-acknowledged request may stay pending before it is expired
    pub transaction_timeout_secs: u64,

    /// STUN/TURN servers handed to the media engine
    pub ice_servers: Vec<IceServer>,

    /// Capacity of the UI notification channel
    pub event_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8188".to_string(),
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            plugin: DEFAULT_PLUGIN.to_string(),
            connect_timeout_secs: 10,
            keepalive_interval_secs: 20,
            transaction_timeout_secs: 10,
            ice_servers: vec![IceServer::stun("stun:stun.l.google.com:19302")],
            event_capacity: 256,
        }
    }
}

impl GatewayConfig {
    /// Default configuration pointing at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document; omitted keys keep their defaults
    pub fn from_toml_str(source: &str) -> GatewayResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| GatewayError::config(format!("Invalid TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Set the websocket subprotocol
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = subprotocol.into();
        self
    }

    /// Set the plugin package name
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = plugin.into();
        self
    }

    /// Set the handshake timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the keepalive interval
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval_secs = interval.as_secs();
        self
    }

    /// Set the pending-transaction timeout
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout_secs = timeout.as_secs();
        self
    }

    /// Replace the ICE server list
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Handshake timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Keepalive interval as a `Duration`
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Transaction timeout as a `Duration`
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction_timeout_secs)
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> GatewayResult<()> {
        if self.url.is_empty() {
            return Err(GatewayError::config("Gateway URL is required"));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(GatewayError::config(format!(
                "Gateway URL must use ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.plugin.is_empty() {
            return Err(GatewayError::config("Plugin name is required"));
        }
        if self.connect_timeout_secs == 0 || self.transaction_timeout_secs == 0 {
            return Err(GatewayError::config("Timeouts must be at least one second"));
        }
        if self.keepalive_interval_secs == 0
            || self.keepalive_interval_secs >= GATEWAY_SESSION_TIMEOUT_SECS
        {
            return Err(GatewayError::config(format!(
                "Keepalive interval must be between 1 and {} seconds",
                GATEWAY_SESSION_TIMEOUT_SECS - 1
            )));
        }
        if self.event_capacity == 0 {
            return Err(GatewayError::config("Event capacity must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_gateway_reference_timers() {
        let config = GatewayConfig::default();
        assert_eq!(config.keepalive_interval(), Duration::from_secs(20));
        assert_eq!(config.subprotocol, "janus-protocol");
        assert_eq!(config.ice_servers.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_and_ice_servers() {
        let config = GatewayConfig::from_toml_str(
            r#"
            url = "wss://gw.example.net/janus"
            transaction_timeout_secs = 5

            [[ice_servers]]
            urls = ["turn:turn.example.net:3478"]
            username = "alice"
            credential = "pw"
            "#,
        )
        .unwrap();

        assert_eq!(config.url, "wss://gw.example.net/janus");
        assert_eq!(config.transaction_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.ice_servers[0].username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(GatewayConfig::new("http://gw.example").validate().is_err());
        assert!(GatewayConfig::new("").validate().is_err());

        let too_slow = GatewayConfig::new("ws://gw.example")
            .with_keepalive_interval(Duration::from_secs(30));
        assert!(matches!(
            too_slow.validate(),
            Err(GatewayError::Configuration { .. })
        ));

        let err = GatewayConfig::from_toml_str("url = 42").unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
