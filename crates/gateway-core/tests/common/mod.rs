//! Shared fixtures: a recording media engine and a scripted gateway

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use rvoip_gateway_core::media::{MediaEngine, MediaEngineContext, MediaEventSender};
use rvoip_gateway_core::protocol::{IceCandidate, SessionDescription};
use rvoip_gateway_core::transport::memory::{self, MemoryPeer};
use rvoip_gateway_core::transport::OutboundFrame;
use rvoip_gateway_core::{
    ClientEvent, ClientSnapshot, GatewayClient, GatewayConfig, GatewayError, GatewayResult,
    RegistrationRequest, RegistrationState,
};

pub const SESSION_ID: u64 = 4_400_118_551;
pub const HANDLE_ID: u64 = 7_120_440_003;
pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(200);

pub const LOCAL_OFFER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=local-offer\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
pub const LOCAL_ANSWER: &str = "v=0\r\no=- 2 1 IN IP4 127.0.0.1\r\ns=local-answer\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
pub const REMOTE_OFFER: &str = "v=0\r\no=gw 3 1 IN IP4 192.0.2.10\r\ns=remote-offer\r\nm=audio 20000 RTP/SAVPF 111\r\n";
pub const REMOTE_ANSWER: &str = "v=0\r\no=gw 4 1 IN IP4 192.0.2.10\r\ns=remote-answer\r\nm=audio 20002 RTP/SAVPF 111\r\n";

/// Everything the mock engine was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateOffer,
    CreateAnswer,
    ApplyLocal(SessionDescription),
    ApplyRemote(SessionDescription),
    AddCandidate(IceCandidate),
    Close,
}

#[derive(Default)]
struct ProbeState {
    calls: Vec<EngineCall>,
    sender: Option<MediaEventSender>,
    fail_offer: bool,
    fail_remote: bool,
    candidate_on_close: bool,
}

/// Test-side view into a [`MockMediaEngine`]
#[derive(Clone, Default)]
pub struct EngineProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl EngineProbe {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&EngineCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| matches(c)).count()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    /// Callback channel handed over at bind time
    pub fn sender(&self) -> MediaEventSender {
        self.state.lock().sender.clone().expect("engine was never bound")
    }

    pub fn fail_next_offer(&self) {
        self.state.lock().fail_offer = true;
    }

    pub fn fail_remote_descriptions(&self) {
        self.state.lock().fail_remote = true;
    }

    /// Emit a late local candidate from inside `close`
    pub fn emit_candidate_on_close(&self) {
        self.state.lock().candidate_on_close = true;
    }
}

/// Media engine that records every call
pub struct MockMediaEngine {
    probe: EngineProbe,
}

pub fn mock_engine() -> (MockMediaEngine, EngineProbe) {
    let probe = EngineProbe::default();
    (MockMediaEngine { probe: probe.clone() }, probe)
}

impl MockMediaEngine {
    fn record(&self, call: EngineCall) {
        self.probe.state.lock().calls.push(call);
    }
}

#[async_trait::async_trait]
impl MediaEngine for MockMediaEngine {
    fn bind(&mut self, context: MediaEngineContext) {
        assert!(!context.ice_servers.is_empty(), "engine bound without STUN servers");
        self.probe.state.lock().sender = Some(context.events);
    }

    async fn create_local_offer(&mut self) -> GatewayResult<SessionDescription> {
        self.record(EngineCall::CreateOffer);
        let failing = std::mem::take(&mut self.probe.state.lock().fail_offer);
        if failing {
            return Err(GatewayError::media("no microphone"));
        }
        Ok(SessionDescription::offer(LOCAL_OFFER))
    }

    async fn create_local_answer(&mut self) -> GatewayResult<SessionDescription> {
        self.record(EngineCall::CreateAnswer);
        Ok(SessionDescription::answer(LOCAL_ANSWER))
    }

    async fn apply_local_description(&mut self, description: &SessionDescription) -> GatewayResult<()> {
        self.record(EngineCall::ApplyLocal(description.clone()));
        Ok(())
    }

    async fn apply_remote_description(&mut self, description: &SessionDescription) -> GatewayResult<()> {
        self.record(EngineCall::ApplyRemote(description.clone()));
        if self.probe.state.lock().fail_remote {
            return Err(GatewayError::media("remote description rejected"));
        }
        Ok(())
    }

    async fn add_remote_ice_candidate(&mut self, candidate: &IceCandidate) -> GatewayResult<()> {
        self.record(EngineCall::AddCandidate(candidate.clone()));
        Ok(())
    }

    async fn close(&mut self) {
        self.record(EngineCall::Close);
        let state = self.probe.state.lock();
        if state.candidate_on_close {
            if let Some(sender) = &state.sender {
                sender.local_candidate(candidate(99));
            }
        }
    }
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate::new("0", 0, format!("candidate:{} 1 udp 2122260223 192.0.2.{} 4000{} typ host", n, n, n))
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig::new("ws://gateway.test:8188/janus")
}

/// The gateway end of an in-process control channel
pub struct FakeGateway {
    pub peer: MemoryPeer,
}

impl FakeGateway {
    /// Next request, whatever it is
    pub async fn next_request(&mut self) -> Value {
        self.peer.recv_request(WAIT).await.expect("no request from client")
    }

    /// Next request, asserting its verb
    pub async fn expect(&mut self, verb: &str) -> Value {
        let request = self.next_request().await;
        assert_eq!(request["janus"], verb, "unexpected request {}", request);
        request
    }

    /// Next request, asserting it is a SIP plugin message named `name`
    pub async fn expect_sip(&mut self, name: &str) -> Value {
        let request = self.expect("message").await;
        assert_eq!(request["body"]["request"], name, "unexpected SIP request {}", request);
        assert_eq!(request["session_id"], SESSION_ID);
        assert_eq!(request["handle_id"], HANDLE_ID);
        request
    }

    /// Assert the client writes nothing for a while
    pub async fn expect_silence(&mut self) {
        if let Some(frame) = self.peer.recv_frame(QUIET).await {
            panic!("client sent {:?}", frame);
        }
    }

    /// Text frames until the channel goes quiet
    pub async fn drain(&mut self) -> Vec<Value> {
        let mut requests = Vec::new();
        while let Some(frame) = self.peer.recv_frame(QUIET).await {
            if let OutboundFrame::Text(text) = frame {
                requests.push(serde_json::from_str(&text).expect("client sent invalid JSON"));
            }
        }
        requests
    }

    pub fn deliver(&self, frame: Value) {
        assert!(self.peer.deliver(frame), "client inbound channel closed");
    }

    pub fn success(&self, request: &Value, session_id: Option<u64>, id: u64) {
        let mut frame = json!({
            "janus": "success",
            "transaction": request["transaction"],
            "data": {"id": id}
        });
        if let Some(session_id) = session_id {
            frame["session_id"] = json!(session_id);
        }
        self.deliver(frame);
    }

    pub fn ack(&self, request: &Value) {
        self.deliver(json!({
            "janus": "ack",
            "session_id": SESSION_ID,
            "transaction": request["transaction"]
        }));
    }

    pub fn error(&self, request: &Value, code: u16, reason: &str) {
        self.deliver(json!({
            "janus": "error",
            "transaction": request["transaction"],
            "error": {"code": code, "reason": reason}
        }));
    }

    /// SIP plugin event, optionally answering `request` and carrying a description
    pub fn sip_event(
        &self,
        request: Option<&Value>,
        call_id: Option<&str>,
        result: Value,
        jsep: Option<SessionDescription>,
    ) {
        let mut data = json!({"sip": "event", "result": result});
        if let Some(call_id) = call_id {
            data["call_id"] = json!(call_id);
        }
        let mut frame = json!({
            "janus": "event",
            "session_id": SESSION_ID,
            "sender": HANDLE_ID,
            "plugindata": {"plugin": "janus.plugin.sip", "data": data}
        });
        if let Some(request) = request {
            frame["transaction"] = request["transaction"].clone();
        }
        if let Some(jsep) = jsep {
            frame["jsep"] = serde_json::to_value(jsep).expect("jsep encodes");
        }
        self.deliver(frame);
    }

    pub fn plugin_error(&self, request: &Value, code: u16, reason: &str) {
        self.deliver(json!({
            "janus": "event",
            "session_id": SESSION_ID,
            "sender": HANDLE_ID,
            "transaction": request["transaction"],
            "plugindata": {"plugin": "janus.plugin.sip", "data": {"sip": "event", "error_code": code, "error": reason}}
        }));
    }

    pub fn trickle(&self, candidate: &IceCandidate) {
        self.deliver(json!({
            "janus": "trickle",
            "session_id": SESSION_ID,
            "sender": HANDLE_ID,
            "candidate": candidate
        }));
    }

    /// Answer `create` and `attach`
    pub async fn bootstrap(&mut self) {
        let create = self.expect("create").await;
        assert!(create.get("session_id").is_none());
        self.success(&create, None, SESSION_ID);

        let attach = self.expect("attach").await;
        assert_eq!(attach["session_id"], SESSION_ID);
        assert_eq!(attach["plugin"], "janus.plugin.sip");
        self.success(&attach, Some(SESSION_ID), HANDLE_ID);
    }
}

pub struct Harness {
    pub client: GatewayClient,
    pub events: broadcast::Receiver<ClientEvent>,
    pub gateway: FakeGateway,
    pub engine: EngineProbe,
}

/// Client over a memory channel, nothing answered yet
pub fn start() -> Harness {
    start_with(test_config())
}

pub fn start_with(config: GatewayConfig) -> Harness {
    let (channels, peer) = memory::pair();
    let (engine, probe) = mock_engine();
    let (client, events) = GatewayClient::start(config, channels, engine).expect("valid config");
    Harness {
        client,
        events,
        gateway: FakeGateway { peer },
        engine: probe,
    }
}

/// Client with session and handle established
pub async fn ready() -> Harness {
    let mut harness = start();
    harness.gateway.bootstrap().await;
    harness.client.wait_until_ready().await.expect("bootstrap succeeds");
    harness
}

pub fn alice() -> RegistrationRequest {
    RegistrationRequest::new("alice")
        .with_secret("s3cr3t")
        .with_proxy("proxy.example:5060")
}

/// Client registered as alice
pub async fn registered() -> Harness {
    let mut harness = ready().await;
    harness.client.register(alice()).await.expect("register accepted");
    let register = harness.gateway.expect_sip("register").await;
    harness.gateway.ack(&register);
    harness.gateway.sip_event(
        Some(&register),
        None,
        json!({"event": "registered", "username": "sip:alice", "register_sent": true}),
        None,
    );
    harness
        .wait_snapshot(|s| s.registration == RegistrationState::Registered)
        .await;
    harness
}

impl Harness {
    /// Poll the snapshot until `predicate` holds
    pub async fn wait_snapshot(&self, predicate: impl Fn(&ClientSnapshot) -> bool) -> ClientSnapshot {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let snapshot = self.client.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("snapshot never matched, last {:?}", snapshot);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Next event matching `predicate`, skipping the rest
    pub async fn next_event(&mut self, predicate: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        self.next_event_within(WAIT, predicate).await
    }

    pub async fn next_event_within(
        &mut self,
        timeout: Duration,
        predicate: impl Fn(&ClientEvent) -> bool,
    ) -> ClientEvent {
        let wait = async {
            loop {
                match self.events.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.expect("event never arrived")
    }

    /// Every event already emitted
    pub fn pending_events(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
