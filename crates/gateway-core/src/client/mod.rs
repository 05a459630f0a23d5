//! Gateway client
//!
//! The client is split the same way on both sides of a channel boundary:
//!
//! - [`GatewayClient`] is a cheap, cloneable handle. Every operation is a
//!   [`Command`](actor::Command) sent to the actor with a oneshot reply.
//! - The actor owns every piece of mutable state (session lifecycle, registration,
//!   the current call, the transaction tracker, the keepalive timer and the media
//!   engine) and runs one `select!` loop over control-channel frames, media engine
//!   callbacks, commands and timers.
//!
//! ```text
//!   GatewayClient ──Command──►┐
//!   websocket reader ─Frame─► │  ClientActor  ──Request──► websocket writer
//!   MediaEngine ──EpochEvent─►│  (one task)   ──calls────► MediaEngine
//!   keepalive / expiry ──────►┘               ──ClientEvent► subscribers
//! ```
//!
//! Because only the actor touches state, a media callback and a gateway frame can
//! never interleave inside a transition.
//!
//! # Examples
//!
//! ```rust,no_run
//! use rvoip_gateway_core::{GatewayClient, GatewayConfig, RegistrationRequest};
//! # use rvoip_gateway_core::media::{MediaEngine, MediaEngineContext};
//! # use rvoip_gateway_core::protocol::{IceCandidate, SessionDescription};
//! # use rvoip_gateway_core::GatewayResult;
//! # struct Engine;
//! # #[async_trait::async_trait]
//! # impl MediaEngine for Engine {
//! #     fn bind(&mut self, _: MediaEngineContext) {}
//! #     async fn create_local_offer(&mut self) -> GatewayResult<SessionDescription> { Ok(SessionDescription::offer("v=0")) }
//! #     async fn create_local_answer(&mut self) -> GatewayResult<SessionDescription> { Ok(SessionDescription::answer("v=0")) }
//! #     async fn apply_local_description(&mut self, _: &SessionDescription) -> GatewayResult<()> { Ok(()) }
//! #     async fn apply_remote_description(&mut self, _: &SessionDescription) -> GatewayResult<()> { Ok(()) }
//! #     async fn add_remote_ice_candidate(&mut self, _: &IceCandidate) -> GatewayResult<()> { Ok(()) }
//! #     async fn close(&mut self) {}
//! # }
//!
//! # async fn example() -> GatewayResult<()> {
//! let config = GatewayConfig::new("wss://gateway.example.com/janus");
//! let (client, mut events) = GatewayClient::connect(config, Engine).await?;
//!
//! client.wait_until_ready().await?;
//! client
//!     .register(RegistrationRequest::new("alice@example.com").with_secret("s3cr3t"))
//!     .await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.status_text());
//! }
//! # Ok(())
//! # }
//! ```

pub(crate) mod actor;
mod handle;

pub use handle::{ClientSnapshot, GatewayClient};
