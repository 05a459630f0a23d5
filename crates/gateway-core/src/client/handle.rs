//! Public client handle

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::info;

use super::actor::{ClientActor, Command};
use crate::call::CallSnapshot;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{ClientEvent, EventEmitter};
use crate::media::MediaEngine;
use crate::registration::{RegistrationRequest, RegistrationState};
use crate::session::SessionState;
use crate::transport::{websocket, TransportChannels};

const COMMAND_CAPACITY: usize = 64;

/// Point-in-time view of the client state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientSnapshot {
    /// Session lifecycle state
    pub session_state: SessionState,
    /// Gateway session id
    pub session_id: Option<u64>,
    /// SIP plugin handle id
    pub handle_id: Option<u64>,
    /// Registration state
    pub registration: RegistrationState,
    /// Current call
    pub call: Option<CallSnapshot>,
    /// The actor has stopped; no further operation will succeed
    pub stopped: bool,
    /// The fatal error that stopped the actor
    pub last_error: Option<GatewayError>,
}

impl ClientSnapshot {
    /// Whether SIP requests may be issued
    pub fn is_ready(&self) -> bool {
        self.session_state == SessionState::HandleAttached && !self.stopped
    }
}

/// Handle to a running gateway client
///
/// Clones share the same client. When the last clone is dropped the client hangs up
/// any call, destroys its gateway session and closes the control channel.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ClientSnapshot>,
    events: EventEmitter,
}

impl GatewayClient {
    /// Open the websocket control channel and start the client
    pub async fn connect<E>(
        config: GatewayConfig,
        engine: E,
    ) -> GatewayResult<(Self, broadcast::Receiver<ClientEvent>)>
    where
        E: MediaEngine + 'static,
    {
        config.validate()?;
        let channels = websocket::connect(&config).await?;
        Self::start(config, channels, engine)
    }

    /// Start the client over an already established control channel
    ///
    /// The returned receiver is subscribed before the first state transition.
    pub fn start<E>(
        config: GatewayConfig,
        channels: TransportChannels,
        engine: E,
    ) -> GatewayResult<(Self, broadcast::Receiver<ClientEvent>)>
    where
        E: MediaEngine + 'static,
    {
        config.validate()?;

        let events = EventEmitter::new(config.event_capacity);
        let receiver = events.subscribe();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(ClientSnapshot::default());

        info!(url = %config.url, plugin = %config.plugin, "Starting gateway client");
        let actor = ClientActor::new(
            config,
            channels,
            Box::new(engine),
            command_rx,
            events.clone(),
            snapshot_tx,
        );
        tokio::spawn(actor.run());

        Ok((
            Self {
                commands: command_tx,
                snapshot: snapshot_rx,
                events,
            },
            receiver,
        ))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<GatewayResult<T>>) -> Command,
    ) -> GatewayResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| GatewayError::NotConnected)?;
        response.await.map_err(|_| GatewayError::NotConnected)?
    }

    /// Register an identity with the gateway's registrar
    ///
    /// Returns once the request is sent; the outcome arrives as a
    /// [`ClientEvent::RegistrationChanged`].
    pub async fn register(&self, request: RegistrationRequest) -> GatewayResult<()> {
        self.request(|reply| Command::Register { request, reply }).await
    }

    /// Remove the registration
    pub async fn unregister(&self) -> GatewayResult<()> {
        self.request(|reply| Command::Unregister { reply }).await
    }

    /// Call `uri`
    ///
    /// Returns once the offer is sent. Fails with [`GatewayError::Busy`] while
    /// another call is active.
    pub async fn place_call(&self, uri: impl Into<String>) -> GatewayResult<()> {
        let uri = uri.into();
        self.request(|reply| Command::PlaceCall { uri, reply }).await
    }

    /// Answer the incoming call
    pub async fn answer(&self) -> GatewayResult<()> {
        self.request(|reply| Command::Answer { reply }).await
    }

    /// Refuse the incoming call, with an optional SIP status code
    pub async fn decline(&self, code: Option<u16>) -> GatewayResult<()> {
        self.request(|reply| Command::Decline { code, reply }).await
    }

    /// End the current call
    pub async fn hangup(&self) -> GatewayResult<()> {
        self.request(|reply| Command::Hangup { reply }).await
    }

    /// Hang up, destroy the gateway session and close the control channel
    pub async fn disconnect(&self) -> GatewayResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Current state
    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the SIP plugin handle is attached
    ///
    /// Fails with the fatal error if bootstrap aborts.
    pub async fn wait_until_ready(&self) -> GatewayResult<()> {
        let mut receiver = self.snapshot.clone();
        let current = match receiver.wait_for(|s| s.is_ready() || s.stopped).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot.borrow().clone(),
        };
        if current.is_ready() {
            Ok(())
        } else {
            Err(current.last_error.unwrap_or(GatewayError::NotConnected))
        }
    }

    /// Another event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Whether the actor is still running
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}
