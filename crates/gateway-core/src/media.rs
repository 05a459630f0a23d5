//! Media engine contract
//!
//! The real-time media engine (peer connection, codecs, ICE transport, audio
//! capture) lives outside this crate. The client drives it through
//! [`MediaEngine`] and receives its asynchronous callbacks through the
//! [`MediaEventSender`] handed over in [`MediaEngine::bind`].
//!
//! Callbacks enter the same actor queue as control-channel frames, so the two
//! sources are serialized against each other. Each callback is stamped with the
//! call epoch current when it was sent; when a call is released the epoch moves on
//! and late callbacks from the released call are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::IceServer;
use crate::error::GatewayResult;
use crate::protocol::{IceCandidate, SessionDescription};

/// Transport state reported by the media engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    /// Not started
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Connectivity lost, may recover
    Disconnected,
    /// Connectivity lost for good
    Failed,
    /// Engine closed the connection
    Closed,
}

/// Asynchronous callbacks from the media engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// A local candidate was gathered; `None` marks the end of gathering
    LocalIceCandidate(Option<IceCandidate>),
    /// Remote media arrived
    RemoteMediaStream {
        /// Engine specific stream identifier
        stream_id: String,
    },
    /// The peer connection changed state
    ConnectionStateChanged(PeerConnectionState),
}

/// A media callback stamped with the epoch it was emitted in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochEvent {
    /// Call epoch at emission time
    pub epoch: u64,
    /// The callback
    pub event: MediaEvent,
}

/// Callback channel handed to the media engine
#[derive(Debug, Clone)]
pub struct MediaEventSender {
    tx: mpsc::UnboundedSender<EpochEvent>,
    epoch: Arc<AtomicU64>,
}

impl MediaEventSender {
    /// Create the sender together with the receiving end and the shared epoch
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<EpochEvent>, Arc<AtomicU64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                epoch: epoch.clone(),
            },
            rx,
            epoch,
        )
    }

    /// Deliver a callback; returns `false` once the client is gone
    pub fn send(&self, event: MediaEvent) -> bool {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.tx.send(EpochEvent { epoch, event }).is_ok()
    }

    /// Shorthand for a gathered local candidate
    pub fn local_candidate(&self, candidate: IceCandidate) -> bool {
        self.send(MediaEvent::LocalIceCandidate(Some(candidate)))
    }

    /// Shorthand for the end of local gathering
    pub fn gathering_complete(&self) -> bool {
        self.send(MediaEvent::LocalIceCandidate(None))
    }

    /// Shorthand for a connection state change
    pub fn connection_state(&self, state: PeerConnectionState) -> bool {
        self.send(MediaEvent::ConnectionStateChanged(state))
    }
}

/// What the media engine receives when the client binds it
#[derive(Debug, Clone)]
pub struct MediaEngineContext {
    /// Callback channel
    pub events: MediaEventSender,
    /// STUN/TURN servers to use for gathering
    pub ice_servers: Vec<IceServer>,
}

/// Narrow contract the client consumes from the media engine
///
/// Methods are awaited one at a time from the client actor, so implementations
/// never see concurrent calls. A successful return from
/// [`apply_local_description`](MediaEngine::apply_local_description) and
/// [`apply_remote_description`](MediaEngine::apply_remote_description) is the
/// engine's confirmation that the description is in effect.
#[async_trait]
pub trait MediaEngine: Send {
    /// Called once before any other method
    fn bind(&mut self, context: MediaEngineContext);

    /// Produce a local audio offer
    async fn create_local_offer(&mut self) -> GatewayResult<SessionDescription>;

    /// Produce a local answer to the applied remote offer
    async fn create_local_answer(&mut self) -> GatewayResult<SessionDescription>;

    /// Make `description` the local description
    async fn apply_local_description(&mut self, description: &SessionDescription) -> GatewayResult<()>;

    /// Make `description` the remote description
    async fn apply_remote_description(&mut self, description: &SessionDescription) -> GatewayResult<()>;

    /// Add one remote candidate; only called after a remote description is applied
    async fn add_remote_ice_candidate(&mut self, candidate: &IceCandidate) -> GatewayResult<()>;

    /// Release local tracks and the peer connection before returning
    async fn close(&mut self);
}
