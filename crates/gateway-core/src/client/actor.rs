//! The single task that owns all client state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::handle::ClientSnapshot;
use crate::call::{CallDirection, CallSession, CallState};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{CallActions, ClientEvent, EventEmitter, MediaStatus};
use crate::media::{EpochEvent, MediaEngine, MediaEngineContext, MediaEvent, MediaEventSender, PeerConnectionState};
use crate::protocol::{
    normalize_sip_uri, IceCandidate, InboundMessage, Request, SessionDescription, SipRequest,
    TrickleCandidate,
};
use crate::registration::{Registration, RegistrationRequest, RegistrationState};
use crate::router::{self, CallSignal, CallUpdate, RegistrationUpdate, Route};
use crate::session::{SessionLifecycle, SessionState};
use crate::transport::transaction::new_transaction_id;
use crate::transport::{Connection, Keepalive, TransactionKind, TransactionTracker, TransportChannels, TransportEvent};

const EXPIRY_SWEEP: Duration = Duration::from_secs(1);

type Reply = oneshot::Sender<GatewayResult<()>>;

/// Requests from [`GatewayClient`](super::GatewayClient) handles
#[derive(Debug)]
pub(crate) enum Command {
    Register { request: RegistrationRequest, reply: Reply },
    Unregister { reply: Reply },
    PlaceCall { uri: String, reply: Reply },
    Answer { reply: Reply },
    Decline { code: Option<u16>, reply: Reply },
    Hangup { reply: Reply },
    Disconnect { reply: Reply },
}

pub(crate) struct ClientActor {
    config: GatewayConfig,
    connection: Connection,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
    media_events: mpsc::UnboundedReceiver<EpochEvent>,
    epoch: Arc<AtomicU64>,
    engine: Box<dyn MediaEngine>,

    lifecycle: SessionLifecycle,
    registration: Registration,
    call: Option<CallSession>,
    tracker: TransactionTracker,
    keepalive: Keepalive,

    events: EventEmitter,
    snapshot: watch::Sender<ClientSnapshot>,
    actions: CallActions,
    // Fatal error raised by a send, handled after the current step
    pending_failure: Option<GatewayError>,
    last_error: Option<GatewayError>,
    running: bool,
}

impl ClientActor {
    pub(crate) fn new(
        config: GatewayConfig,
        channels: TransportChannels,
        mut engine: Box<dyn MediaEngine>,
        commands: mpsc::Receiver<Command>,
        events: EventEmitter,
        snapshot: watch::Sender<ClientSnapshot>,
    ) -> Self {
        let (sender, media_events, epoch) = MediaEventSender::channel();
        engine.bind(MediaEngineContext {
            events: sender,
            ice_servers: config.ice_servers.clone(),
        });

        Self {
            keepalive: Keepalive::new(config.keepalive_interval()),
            config,
            connection: channels.connection,
            inbound: channels.inbound,
            commands,
            media_events,
            epoch,
            engine,
            lifecycle: SessionLifecycle::new(),
            registration: Registration::new(),
            call: None,
            tracker: TransactionTracker::new(),
            events,
            snapshot,
            actions: CallActions::default(),
            pending_failure: None,
            last_error: None,
            running: true,
        }
    }

    pub(crate) async fn run(mut self) {
        self.start_bootstrap();
        self.after_step().await;

        let mut sweep = interval(EXPIRY_SWEEP);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            let armed = self.keepalive.is_armed();
            tokio::select! {
                biased;

                event = self.inbound.recv() => match event {
                    Some(TransportEvent::Frame(text)) => self.on_frame(&text).await,
                    Some(TransportEvent::Closed { reason }) => {
                        self.fail(GatewayError::transport(format!("control channel closed: {}", reason))).await;
                    }
                    None => self.fail(GatewayError::transport("control channel dropped")).await,
                },

                Some(event) = self.media_events.recv() => self.on_media_event(event).await,

                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        debug!("All client handles dropped, shutting down");
                        self.shutdown().await;
                    }
                },

                _ = self.keepalive.tick(), if armed => self.send_keepalive(),

                _ = sweep.tick() => self.expire_transactions().await,
            }
            self.after_step().await;
        }

        info!("Gateway client stopped");
    }

    /// Handle a fatal send failure and publish the resulting state
    async fn after_step(&mut self) {
        if let Some(error) = self.pending_failure.take() {
            if self.running {
                self.fail(error).await;
            }
        }
        self.publish();
    }

    fn publish(&mut self) {
        let actions = CallActions::derive(self.registration.state(), self.call.as_ref());
        if actions != self.actions {
            self.actions = actions;
            self.events.emit(ClientEvent::ActionsChanged(actions));
        }

        self.snapshot.send_replace(ClientSnapshot {
            session_state: self.lifecycle.state(),
            session_id: self.lifecycle.session_id(),
            handle_id: self.lifecycle.handle_id(),
            registration: self.registration.state().clone(),
            call: self.call.as_ref().map(CallSession::snapshot),
            stopped: !self.running,
            last_error: self.last_error.clone(),
        });
    }

    // ---- outbound ----

    fn send_request(&mut self, kind: TransactionKind, request: Request) -> GatewayResult<()> {
        if request.is_handle_scoped() && self.lifecycle.scope().is_none() {
            return Err(GatewayError::invalid_state(
                "SIP request before the session and plugin handle exist",
            ));
        }

        let frame = serde_json::to_string(&request)
            .map_err(|e| GatewayError::protocol(format!("Failed to encode request: {}", e)))?;
        if let Err(e) = self.connection.send(frame) {
            if self.pending_failure.is_none() {
                self.pending_failure = Some(e.clone());
            }
            return Err(e);
        }

        debug!(
            transaction = %request.transaction,
            ?kind,
            session_id = ?request.session_id,
            handle_id = ?request.handle_id,
            "Sent request"
        );
        self.tracker.insert(request.transaction, kind, Instant::now());
        Ok(())
    }

    fn send_sip(
        &mut self,
        kind: TransactionKind,
        body: SipRequest,
        jsep: Option<SessionDescription>,
    ) -> GatewayResult<()> {
        let (session_id, handle_id) = self
            .lifecycle
            .scope()
            .ok_or_else(|| GatewayError::invalid_state("SIP plugin handle is not attached"))?;
        trace!(request = body.name(), "Sending SIP request");
        let request = Request::message(new_transaction_id(), session_id, handle_id, body, jsep);
        self.send_request(kind, request)
    }

    fn send_trickle(&mut self, candidate: TrickleCandidate) -> GatewayResult<()> {
        let (session_id, handle_id) = self
            .lifecycle
            .scope()
            .ok_or_else(|| GatewayError::invalid_state("SIP plugin handle is not attached"))?;
        let request = Request::trickle(new_transaction_id(), session_id, handle_id, candidate);
        self.send_request(TransactionKind::Trickle, request)
    }

    fn send_keepalive(&mut self) {
        let Some(session_id) = self.lifecycle.session_id() else {
            self.keepalive.disarm();
            return;
        };
        trace!(session_id, "Keepalive");
        let _ = self.send_request(TransactionKind::Keepalive, Request::keepalive(new_transaction_id(), session_id));
    }

    // ---- session lifecycle ----

    fn start_bootstrap(&mut self) {
        if let Err(e) = self.lifecycle.on_connected() {
            warn!(error = %e, "Unexpected bootstrap start");
            return;
        }
        self.emit_connection_status();
        let _ = self.send_request(TransactionKind::CreateSession, Request::create(new_transaction_id()));
    }

    fn on_session_created(&mut self, session_id: u64) {
        if let Err(e) = self.lifecycle.on_session_created(session_id) {
            warn!(error = %e, session_id, "Dropping session-create acknowledgment");
            return;
        }
        info!(session_id, "Gateway session created");
        self.keepalive.arm();
        self.emit_connection_status();

        let plugin = self.config.plugin.clone();
        let _ = self.send_request(
            TransactionKind::AttachHandle,
            Request::attach(new_transaction_id(), session_id, plugin),
        );
    }

    fn on_handle_attached(&mut self, handle_id: u64) {
        if let Err(e) = self.lifecycle.on_handle_attached(handle_id) {
            warn!(error = %e, handle_id, "Dropping handle-attach acknowledgment");
            return;
        }
        info!(session_id = ?self.lifecycle.session_id(), handle_id, "SIP plugin attached");
        self.emit_connection_status();
    }

    fn emit_connection_status(&self) {
        self.events.emit(ClientEvent::ConnectionStatus {
            state: self.lifecycle.state(),
        });
    }

    /// Fatal failure: reset everything, tell the UI, stop
    async fn fail(&mut self, error: GatewayError) {
        error!(error = %error, category = error.category(), "Gateway client failed");
        self.last_error = Some(error.clone());
        self.teardown("connection lost").await;
        self.events.emit(ClientEvent::ConnectionFailed { error });
    }

    /// Reset every derived state and stop the actor
    async fn teardown(&mut self, call_reason: &str) {
        self.keepalive.disarm();
        self.tracker.clear();

        if self.call.is_some() {
            self.release_call(false, None, Some(call_reason.to_string())).await;
        }

        if *self.registration.state() != RegistrationState::Unregistered {
            self.registration.reset();
            self.events.emit(ClientEvent::RegistrationChanged {
                state: RegistrationState::Unregistered,
            });
        }

        if self.lifecycle.state() != SessionState::Disconnected {
            self.lifecycle.reset();
            self.emit_connection_status();
        }

        self.connection.close();
        self.running = false;
    }

    /// Orderly shutdown: end the call, destroy the session, close the channel
    async fn shutdown(&mut self) {
        if self.call.as_ref().is_some_and(CallSession::is_active) {
            self.end_call_locally("client disconnected").await;
        }
        if let Some(session_id) = self.lifecycle.session_id() {
            let _ = self.send_request(TransactionKind::Destroy, Request::destroy(new_transaction_id(), session_id));
        }
        self.pending_failure = None;
        self.teardown("client disconnected").await;
    }

    async fn expire_transactions(&mut self) {
        let expired = self
            .tracker
            .expire(Instant::now(), self.config.transaction_timeout());
        for (transaction, kind) in expired {
            if kind.is_bootstrap() {
                self.fail(GatewayError::bootstrap(
                    None,
                    format!("{:?} request {} timed out", kind, transaction),
                ))
                .await;
                return;
            }
            warn!(transaction = %transaction, ?kind, "Request timed out without an answer");
            if kind == TransactionKind::Register {
                self.on_registration_update(RegistrationUpdate::Failed {
                    code: None,
                    reason: "register timed out".to_string(),
                });
            }
        }
    }

    // ---- inbound ----

    async fn on_frame(&mut self, text: &str) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };
        trace!(transaction = ?message.transaction(), ?message, "Inbound message");

        match router::route(&mut self.tracker, message) {
            Route::SessionCreated { session_id } => self.on_session_created(session_id),
            Route::HandleAttached { handle_id } => self.on_handle_attached(handle_id),
            Route::Acknowledged { .. } | Route::Ignored => {}
            Route::RequestFailed { kind, code, reason } => self.on_request_failed(kind, code, reason).await,
            Route::Registration(update) => self.on_registration_update(update),
            Route::Call(update) => self.on_call_update(update).await,
            Route::RemoteCandidate(candidate) => self.on_remote_candidate(candidate).await,
            Route::Media(status) => {
                debug!(?status, "Media status");
                self.events.emit(ClientEvent::MediaStatus(status));
            }
            Route::SessionLost { reason } => self.fail(GatewayError::transport(reason)).await,
        }
    }

    async fn on_request_failed(&mut self, kind: Option<TransactionKind>, code: Option<u16>, reason: String) {
        match kind {
            Some(kind) if kind.is_bootstrap() => {
                self.fail(GatewayError::bootstrap(code, reason)).await;
            }
            _ if !self.lifecycle.is_ready() => {
                self.fail(GatewayError::bootstrap(code, reason)).await;
            }
            Some(TransactionKind::Register) => {
                self.on_registration_update(RegistrationUpdate::Failed { code, reason });
            }
            Some(kind) if kind.is_call_scoped() => {
                self.on_call_update(CallUpdate {
                    call_id: None,
                    jsep: None,
                    signal: CallSignal::Failed { code, reason },
                })
                .await;
            }
            _ => warn!(?kind, code = ?code, reason = %reason, "Gateway error response"),
        }
    }

    fn on_registration_update(&mut self, update: RegistrationUpdate) {
        let changed = match update {
            RegistrationUpdate::Registered => self.registration.on_registered(),
            RegistrationUpdate::Failed { code, reason } => {
                warn!(code = ?code, reason = %reason, "Registration failed");
                self.registration.on_failed(code, reason)
            }
            RegistrationUpdate::Unregistered => {
                debug!("Gateway confirmed unregistration");
                false
            }
        };
        if changed {
            info!(state = %self.registration.state(), identity = ?self.registration.identity(), "Registration changed");
            self.emit_registration();
        }
    }

    fn emit_registration(&self) {
        self.events.emit(ClientEvent::RegistrationChanged {
            state: self.registration.state().clone(),
        });
    }

    async fn on_call_update(&mut self, update: CallUpdate) {
        let CallUpdate { call_id, jsep, signal } = update;

        if let CallSignal::Incoming { caller, display_name } = signal {
            self.on_incoming_call(caller, display_name, call_id, jsep);
            return;
        }

        let Some(call) = self.call.as_mut().filter(|c| c.is_active()) else {
            debug!(?signal, call_id = ?call_id, "Call event without an active call");
            return;
        };
        call.observe_call_id(call_id.as_deref());
        debug!(?signal, call_id = ?call.call_id(), state = %call.state(), "Call event");

        match signal {
            CallSignal::Incoming { .. } | CallSignal::Calling => {}
            CallSignal::Ringing | CallSignal::Proceeding { .. } | CallSignal::Progress => {
                if call.on_ringing() {
                    self.emit_call_status();
                }
                if let Some(answer) = jsep.filter(|d| !d.is_offer()) {
                    self.apply_early_media(answer).await;
                }
            }
            CallSignal::Accepted => self.on_call_accepted(jsep).await,
            CallSignal::Updating => self.on_renegotiation(jsep).await,
            CallSignal::Hangup { code, reason } => self.release_call(false, code, reason).await,
            CallSignal::Failed { code, reason } => {
                warn!(code = ?code, reason = %reason, "Call request refused by the gateway");
                self.release_call(false, code, Some(reason)).await;
            }
        }
    }

    fn on_incoming_call(
        &mut self,
        caller: String,
        display_name: Option<String>,
        call_id: Option<String>,
        jsep: Option<SessionDescription>,
    ) {
        if self.call.as_ref().is_some_and(CallSession::is_active) {
            info!(caller = %caller, "Refusing incoming call, already in a call");
            self.events.emit(ClientEvent::CallRefusedBusy { peer: caller });
            return;
        }

        let offer = jsep.filter(SessionDescription::is_offer);
        let call = CallSession::inbound(caller.clone(), display_name.clone(), call_id.clone(), offer);
        info!(
            caller = %caller,
            call_id = ?call_id,
            with_offer = call.has_pending_remote_description(),
            "Incoming call"
        );
        self.call = Some(call);
        self.events.emit(ClientEvent::IncomingCall {
            caller,
            display_name,
            call_id,
        });
        self.emit_call_status();
    }

    async fn apply_early_media(&mut self, answer: SessionDescription) {
        if self.call.as_ref().is_some_and(CallSession::remote_description_applied) {
            return;
        }
        debug!("Applying early media description");
        if let Err(e) = self.apply_remote(&answer).await {
            self.fail_call(e).await;
        }
    }

    async fn on_call_accepted(&mut self, jsep: Option<SessionDescription>) {
        let Some(call) = self.call.as_mut() else { return };
        if call.direction() == CallDirection::Inbound {
            // Offerless INVITE: our offer went out with accept, the answer comes back here
            match jsep.filter(|d| !d.is_offer()) {
                Some(answer) if !call.remote_description_applied() => {
                    debug!("Applying remote answer to our offer");
                    if let Err(e) = self.apply_remote(&answer).await {
                        self.fail_call(e).await;
                    }
                }
                _ => debug!("Gateway confirmed our answer"),
            }
            return;
        }

        call.set_state(CallState::Accepting);
        let applied = call.remote_description_applied();
        self.emit_call_status();

        match jsep.filter(|d| !d.is_offer()) {
            Some(answer) => {
                if let Err(e) = self.apply_remote(&answer).await {
                    self.fail_call(e).await;
                    return;
                }
            }
            None if applied => {}
            None => {
                self.fail_call(GatewayError::call("call accepted without an answer")).await;
                return;
            }
        }

        if let Some(call) = self.call.as_mut() {
            call.on_accepted();
        }
        self.emit_call_status();
    }

    async fn on_renegotiation(&mut self, jsep: Option<SessionDescription>) {
        let Some(description) = jsep else {
            warn!("Re-INVITE without a description, ignoring");
            return;
        };
        let result = if description.is_offer() {
            self.answer_renegotiation(&description).await
        } else {
            self.apply_remote(&description).await
        };
        if let Err(e) = result {
            self.fail_call(e).await;
        }
    }

    async fn answer_renegotiation(&mut self, offer: &SessionDescription) -> GatewayResult<()> {
        self.apply_remote(offer).await?;
        let answer = self.engine.create_local_answer().await?;
        self.engine.apply_local_description(&answer).await?;
        self.send_sip(TransactionKind::Update, SipRequest::Update, Some(answer))
    }

    /// Apply a remote description, then drain the queued candidates in arrival order
    async fn apply_remote(&mut self, description: &SessionDescription) -> GatewayResult<()> {
        self.engine.apply_remote_description(description).await?;
        let queued = match self.call.as_mut() {
            Some(call) => call.mark_remote_description_applied(),
            None => return Ok(()),
        };
        if !queued.is_empty() {
            debug!(count = queued.len(), "Draining queued remote candidates");
        }
        for candidate in queued {
            self.add_remote_candidate(&candidate).await;
        }
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: &IceCandidate) {
        if let Err(e) = self.engine.add_remote_ice_candidate(candidate).await {
            warn!(error = %e, candidate = %candidate.candidate_text, "Media engine rejected remote candidate");
        }
    }

    async fn on_remote_candidate(&mut self, candidate: Option<IceCandidate>) {
        let Some(call) = self.call.as_mut().filter(|c| c.is_active()) else {
            debug!("Remote candidate without an active call");
            return;
        };
        let Some(candidate) = candidate else {
            debug!("Remote end of candidates");
            return;
        };
        if let Some(candidate) = call.offer_remote_candidate(candidate) {
            self.add_remote_candidate(&candidate).await;
        } else {
            trace!(queued = call.queued_candidates(), "Queued remote candidate");
        }
    }

    // ---- media engine callbacks ----

    async fn on_media_event(&mut self, event: EpochEvent) {
        let current = self.epoch.load(Ordering::SeqCst);
        if event.epoch != current {
            trace!(epoch = event.epoch, current, "Dropping media event from a released call");
            return;
        }

        match event.event {
            MediaEvent::LocalIceCandidate(candidate) => {
                if !self.call.as_ref().is_some_and(CallSession::is_active) {
                    trace!("Local candidate without an active call");
                    return;
                }
                let payload = match candidate {
                    Some(candidate) => TrickleCandidate::Candidate(candidate),
                    None => TrickleCandidate::completed(),
                };
                if let Err(e) = self.send_trickle(payload) {
                    warn!(error = %e, "Failed to trickle local candidate");
                }
            }
            MediaEvent::RemoteMediaStream { stream_id } => {
                debug!(stream_id = %stream_id, "Remote media stream");
                self.events.emit(ClientEvent::RemoteMedia { stream_id });
            }
            MediaEvent::ConnectionStateChanged(state) => self.on_connection_state(state).await,
        }
    }

    async fn on_connection_state(&mut self, state: PeerConnectionState) {
        debug!(?state, "Peer connection state");
        self.events.emit(ClientEvent::MediaStatus(MediaStatus::Transport(state)));

        let Some(call) = self.call.as_mut().filter(|c| c.is_active()) else {
            return;
        };
        match state {
            PeerConnectionState::Connected => {
                if call.on_media_connected() {
                    info!(call_id = ?call.call_id(), peer = %call.peer_uri(), "Call connected");
                    self.emit_call_status();
                }
            }
            PeerConnectionState::Failed => {
                warn!(call_id = ?call.call_id(), "Media connection failed, ending call");
                self.end_call_locally("media connection failed").await;
            }
            _ => {}
        }
    }

    // ---- call teardown ----

    /// Local termination: tell the gateway, then release
    async fn end_call_locally(&mut self, reason: &str) {
        let Some(call) = self.call.as_ref() else { return };
        let (kind, body) = if call.is_unanswered_inbound() {
            (TransactionKind::Decline, SipRequest::Decline { code: None })
        } else {
            (TransactionKind::Hangup, SipRequest::Hangup)
        };
        if let Err(e) = self.send_sip(kind, body, None) {
            warn!(error = %e, "Failed to send call termination");
        }
        self.release_call(true, None, Some(reason.to_string())).await;
    }

    /// Call-level failure from the media engine
    async fn fail_call(&mut self, error: GatewayError) {
        warn!(error = %error, "Call failed");
        self.end_call_locally(&error.to_string()).await;
    }

    /// Release engine resources, clear the call, notify
    async fn release_call(&mut self, locally_initiated: bool, code: Option<u16>, reason: Option<String>) {
        let Some(mut call) = self.call.take() else { return };
        let duration_secs = call.end();
        self.reset_engine().await;

        info!(
            call_id = ?call.call_id(),
            peer = %call.peer_uri(),
            created_at = %call.created_at(),
            locally_initiated,
            code = ?code,
            reason = ?reason,
            "Call ended"
        );
        self.events.emit(ClientEvent::CallStatus {
            peer: call.peer_uri().to_string(),
            state: CallState::Ended,
        });
        self.events.emit(ClientEvent::CallEnded {
            reason,
            code,
            locally_initiated,
            duration_secs,
        });
    }

    /// Release media resources and retire callbacks issued so far
    async fn reset_engine(&mut self) {
        self.engine.close().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_call_status(&self) {
        if let Some(call) = &self.call {
            self.events.emit(ClientEvent::CallStatus {
                peer: call.peer_uri().to_string(),
                state: call.state(),
            });
        }
    }

    // ---- commands ----

    async fn on_command(&mut self, command: Command) {
        let (result, reply) = match command {
            Command::Register { request, reply } => (self.register(request), reply),
            Command::Unregister { reply } => (self.unregister(), reply),
            Command::PlaceCall { uri, reply } => (self.place_call(uri).await, reply),
            Command::Answer { reply } => (self.answer().await, reply),
            Command::Decline { code, reply } => (self.decline(code).await, reply),
            Command::Hangup { reply } => (self.hangup().await, reply),
            Command::Disconnect { reply } => {
                info!("Disconnecting from gateway");
                self.shutdown().await;
                (Ok(()), reply)
            }
        };
        // Callers observe the snapshot their command produced
        self.publish();
        let _ = reply.send(result);
    }

    fn register(&mut self, request: RegistrationRequest) -> GatewayResult<()> {
        let body = self.registration.begin(&request, self.lifecycle.is_ready())?;
        info!(identity = ?self.registration.identity(), "Registering");
        self.emit_registration();
        self.send_sip(TransactionKind::Register, body, None)
    }

    fn unregister(&mut self) -> GatewayResult<()> {
        if !self.lifecycle.is_ready() {
            return Err(GatewayError::NotConnected);
        }
        let body = self.registration.begin_unregister()?;
        info!(identity = ?self.registration.identity(), "Unregistering");
        self.emit_registration();
        self.send_sip(TransactionKind::Unregister, body, None)
    }

    async fn place_call(&mut self, uri: String) -> GatewayResult<()> {
        let uri = normalize_sip_uri(&uri);
        if self.call.as_ref().is_some_and(CallSession::is_active) {
            info!(peer = %uri, "Refusing to place call, already in a call");
            self.events.emit(ClientEvent::CallRefusedBusy { peer: uri.clone() });
            return Err(GatewayError::Busy { peer: uri });
        }
        if !self.lifecycle.is_ready() {
            return Err(GatewayError::NotConnected);
        }
        match self.registration.state() {
            RegistrationState::Registered => {}
            RegistrationState::Failed { code, reason } => {
                return Err(GatewayError::registration(*code, reason.clone()));
            }
            state => {
                return Err(GatewayError::invalid_state(format!("cannot place a call while {}", state)));
            }
        }

        let offer = match self.create_and_apply_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                warn!(error = %e, peer = %uri, "Failed to prepare local offer");
                self.reset_engine().await;
                return Err(e);
            }
        };

        if let Err(e) = self.send_sip(TransactionKind::Call, SipRequest::Call { uri: uri.clone() }, Some(offer)) {
            self.reset_engine().await;
            return Err(e);
        }
        let mut call = CallSession::outbound(uri);
        call.on_offer_sent();
        info!(peer = %call.peer_uri(), "Calling");
        self.call = Some(call);
        self.emit_call_status();
        Ok(())
    }

    async fn create_and_apply_offer(&mut self) -> GatewayResult<SessionDescription> {
        let offer = self.engine.create_local_offer().await?;
        self.engine.apply_local_description(&offer).await?;
        Ok(offer)
    }

    async fn answer(&mut self) -> GatewayResult<()> {
        let call = self
            .call
            .as_mut()
            .filter(|c| c.state() == CallState::IncomingOffered)
            .ok_or_else(|| GatewayError::invalid_state("no incoming call to answer"))?;
        call.set_state(CallState::Answering);
        let offer = call.take_pending_remote_description();
        self.emit_call_status();

        let local = match self.prepare_answer(offer).await {
            Ok(local) => local,
            Err(e) => {
                self.fail_call(e.clone()).await;
                return Err(e);
            }
        };

        self.send_sip(TransactionKind::Accept, SipRequest::Accept, Some(local))?;
        if let Some(call) = self.call.as_mut() {
            call.on_accepted();
            info!(call_id = ?call.call_id(), peer = %call.peer_uri(), "Call answered");
        }
        self.emit_call_status();
        Ok(())
    }

    /// Local answer to the staged offer, or a local offer for an offerless INVITE
    async fn prepare_answer(&mut self, offer: Option<SessionDescription>) -> GatewayResult<SessionDescription> {
        let local = match offer {
            Some(offer) => {
                self.apply_remote(&offer).await?;
                self.engine.create_local_answer().await?
            }
            None => {
                debug!("Incoming call without an offer, answering with a local offer");
                self.engine.create_local_offer().await?
            }
        };
        self.engine.apply_local_description(&local).await?;
        Ok(local)
    }

    async fn decline(&mut self, code: Option<u16>) -> GatewayResult<()> {
        if !self.call.as_ref().is_some_and(|c| c.state() == CallState::IncomingOffered) {
            return Err(GatewayError::invalid_state("no incoming call to decline"));
        }
        let result = self.send_sip(TransactionKind::Decline, SipRequest::Decline { code }, None);
        self.release_call(true, code, Some("declined".to_string())).await;
        result
    }

    async fn hangup(&mut self) -> GatewayResult<()> {
        if !self.call.as_ref().is_some_and(CallSession::is_active) {
            return Err(GatewayError::invalid_state("no call to hang up"));
        }
        self.end_call_locally("local hangup").await;
        Ok(())
    }
}
