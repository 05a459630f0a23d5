//! # Gateway Core - SIP over a WebRTC media gateway
//!
//! This crate registers a SIP identity and places or receives voice calls through a
//! WebRTC media gateway that bridges SIP to WebRTC. It drives the gateway's SIP
//! plugin over a websocket control channel and keeps it in step with an external
//! real-time media engine that does the offer/answer and ICE work.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rvoip_gateway_core::{ClientEvent, GatewayClient, GatewayConfig, RegistrationRequest};
//! # use rvoip_gateway_core::media::{MediaEngine, MediaEngineContext};
//! # use rvoip_gateway_core::protocol::{IceCandidate, SessionDescription};
//! # use rvoip_gateway_core::GatewayResult;
//! # struct WebRtcEngine;
//! # #[async_trait::async_trait]
//! # impl MediaEngine for WebRtcEngine {
//! #     fn bind(&mut self, _: MediaEngineContext) {}
//! #     async fn create_local_offer(&mut self) -> GatewayResult<SessionDescription> { Ok(SessionDescription::offer("v=0")) }
//! #     async fn create_local_answer(&mut self) -> GatewayResult<SessionDescription> { Ok(SessionDescription::answer("v=0")) }
//! #     async fn apply_local_description(&mut self, _: &SessionDescription) -> GatewayResult<()> { Ok(()) }
//! #     async fn apply_remote_description(&mut self, _: &SessionDescription) -> GatewayResult<()> { Ok(()) }
//! #     async fn add_remote_ice_candidate(&mut self, _: &IceCandidate) -> GatewayResult<()> { Ok(()) }
//! #     async fn close(&mut self) {}
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::new("wss://gateway.example.com/janus");
//!     let (client, mut events) = GatewayClient::connect(config, WebRtcEngine).await?;
//!
//!     client.wait_until_ready().await?;
//!     client
//!         .register(
//!             RegistrationRequest::new("alice@example.com")
//!                 .with_secret("s3cr3t")
//!                 .with_proxy("proxy.example.com:5060"),
//!         )
//!         .await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let ClientEvent::RegistrationChanged { state } = &event {
//!             if state.is_registered() {
//!                 client.place_call("bob@example.com").await?;
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`transport`]: websocket (or in-process) control channel, transaction
//!   correlation and the session keepalive
//! - [`session`]: the create/attach bootstrap that gates every SIP request
//! - [`registration`] and [`call`]: the two SIP state machines
//! - [`router`]: classifies inbound messages and addresses them to a state machine
//! - [`client`]: the actor that owns all of the above and the handle that talks to it
//! - [`media`]: the contract the external media engine implements
//! - [`events`]: notifications for a user interface

#![warn(missing_docs)]

pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod protocol;
pub mod registration;
pub mod router;
pub mod session;
pub mod transport;

pub use call::{CallDirection, CallSession, CallSnapshot, CallState};
pub use client::{ClientSnapshot, GatewayClient};
pub use config::{GatewayConfig, IceServer};
pub use error::{GatewayError, GatewayResult};
pub use events::{CallActions, ClientEvent, EventEmitter, MediaStatus};
pub use logging::{setup_logging, LoggingConfig};
pub use media::{MediaEngine, MediaEngineContext, MediaEvent, MediaEventSender, PeerConnectionState};
pub use registration::{RegistrationRequest, RegistrationState};
pub use session::SessionState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
