//! Control-channel wire protocol
//!
//! Requests are JSON envelopes tagged with a verb and a transaction id that the
//! gateway echoes verbatim. SIP requests ride inside `message` envelopes as a `body`
//! object, with an optional `jsep` description alongside; ICE candidates travel in
//! dedicated `trickle` envelopes.

pub mod envelope;
pub mod jsep;
pub mod request;

pub use envelope::{InboundMessage, SipEvent};
pub use jsep::{IceCandidate, SdpType, SessionDescription, TrickleCandidate};
pub use request::{normalize_sip_uri, Request, SipRequest, Verb};
