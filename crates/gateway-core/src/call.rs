//! Call state machine
//!
//! One [`CallSession`] exists per call, and the client holds at most one at a time.
//!
//! ```text
//! Outbound:  Idle ─► Offering ─► Ringing ─► Accepting ─► Accepted ─► Connected ─► Ended
//! Inbound:   Idle ─► IncomingOffered ─► Answering ──────► Accepted ─► Connected ─► Ended
//! ```
//!
//! Remote ICE candidates that arrive before the remote description is in effect are
//! queued in arrival order; [`CallSession::mark_remote_description_applied`] hands
//! them back for draining, after which new candidates pass straight through
//! [`CallSession::offer_remote_candidate`].

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{IceCandidate, SessionDescription};

/// Progress of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallState {
    /// Created, nothing sent yet
    #[default]
    Idle,
    /// Offer sent with the `call` request
    Offering,
    /// The callee is alerting
    Ringing,
    /// Remote answer received, being applied
    Accepting,
    /// Inbound INVITE waiting for the user
    IncomingOffered,
    /// User answered, local answer being produced
    Answering,
    /// Both descriptions exchanged
    Accepted,
    /// Media engine reports a connected transport
    Connected,
    /// Terminal
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CallState::Idle => "idle",
            CallState::Offering => "calling",
            CallState::Ringing => "ringing",
            CallState::Accepting => "accepting",
            CallState::IncomingOffered => "incoming call",
            CallState::Answering => "answering",
            CallState::Accepted => "accepted",
            CallState::Connected => "connected",
            CallState::Ended => "ended",
        };
        f.write_str(text)
    }
}

/// Who initiated the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Placed by this client
    Outbound,
    /// Received from the gateway
    Inbound,
}

/// Read-only view of the current call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSnapshot {
    /// Gateway call id, once known
    pub call_id: Option<String>,
    /// Direction
    pub direction: CallDirection,
    /// Remote party
    pub peer_uri: String,
    /// Current state
    pub state: CallState,
}

/// The single active call
#[derive(Debug, Clone)]
pub struct CallSession {
    call_id: Option<String>,
    direction: CallDirection,
    peer_uri: String,
    display_name: Option<String>,
    state: CallState,
    pending_remote_description: Option<SessionDescription>,
    remote_description_applied: bool,
    queued_remote_candidates: VecDeque<IceCandidate>,
    media_connected: bool,
    created_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
}

impl CallSession {
    fn new(direction: CallDirection, peer_uri: String, state: CallState) -> Self {
        Self {
            call_id: None,
            direction,
            peer_uri,
            display_name: None,
            state,
            pending_remote_description: None,
            remote_description_applied: false,
            queued_remote_candidates: VecDeque::new(),
            media_connected: false,
            created_at: Utc::now(),
            connected_at: None,
        }
    }

    /// Outbound call to `peer_uri`, still `Idle`
    pub fn outbound(peer_uri: impl Into<String>) -> Self {
        Self::new(CallDirection::Outbound, peer_uri.into(), CallState::Idle)
    }

    /// Inbound call from `caller`, staged with its remote offer
    pub fn inbound(
        caller: impl Into<String>,
        display_name: Option<String>,
        call_id: Option<String>,
        offer: Option<SessionDescription>,
    ) -> Self {
        let mut call = Self::new(CallDirection::Inbound, caller.into(), CallState::IncomingOffered);
        call.display_name = display_name;
        call.call_id = call_id;
        call.pending_remote_description = offer;
        call
    }

    /// Gateway call id
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// Record the gateway call id the first time it is seen
    pub fn observe_call_id(&mut self, call_id: Option<&str>) {
        if self.call_id.is_none() {
            self.call_id = call_id.map(str::to_string);
        }
    }

    /// Direction
    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    /// Remote party
    pub fn peer_uri(&self) -> &str {
        &self.peer_uri
    }

    /// Remote party display name, inbound only
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Current state
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Whether the call still holds the client's single call slot
    pub fn is_active(&self) -> bool {
        self.state != CallState::Ended
    }

    /// Inbound call the user has not answered yet
    pub fn is_unanswered_inbound(&self) -> bool {
        self.direction == CallDirection::Inbound
            && matches!(self.state, CallState::IncomingOffered | CallState::Answering)
    }

    /// Move to `state`
    pub fn set_state(&mut self, state: CallState) {
        self.state = state;
    }

    /// `call` request sent with the local offer
    pub fn on_offer_sent(&mut self) {
        self.state = CallState::Offering;
    }

    /// Provisional response; returns whether the state changed
    pub fn on_ringing(&mut self) -> bool {
        if self.state == CallState::Offering {
            self.state = CallState::Ringing;
            true
        } else {
            false
        }
    }

    /// Both descriptions exchanged
    ///
    /// If the media engine already reported a connected transport the call goes
    /// straight to `Connected`.
    pub fn on_accepted(&mut self) {
        if self.media_connected {
            self.mark_connected();
        } else {
            self.state = CallState::Accepted;
        }
    }

    /// The media engine reports a connected transport; returns whether the state changed
    pub fn on_media_connected(&mut self) -> bool {
        self.media_connected = true;
        if self.state == CallState::Accepted {
            self.mark_connected();
            true
        } else {
            false
        }
    }

    fn mark_connected(&mut self) {
        self.state = CallState::Connected;
        self.connected_at.get_or_insert_with(Utc::now);
    }

    /// The remote description waiting to be applied
    pub fn take_pending_remote_description(&mut self) -> Option<SessionDescription> {
        self.pending_remote_description.take()
    }

    /// Whether an offer came with the INVITE
    pub fn has_pending_remote_description(&self) -> bool {
        self.pending_remote_description.is_some()
    }

    /// Whether a remote description is in effect in the media engine
    pub fn remote_description_applied(&self) -> bool {
        self.remote_description_applied
    }

    /// Route one remote candidate
    ///
    /// Returns the candidate when it may be applied now; otherwise it is queued.
    pub fn offer_remote_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.remote_description_applied {
            Some(candidate)
        } else {
            self.queued_remote_candidates.push_back(candidate);
            None
        }
    }

    /// The media engine confirmed the remote description
    ///
    /// Returns the queued candidates in arrival order.
    pub fn mark_remote_description_applied(&mut self) -> Vec<IceCandidate> {
        self.remote_description_applied = true;
        self.queued_remote_candidates.drain(..).collect()
    }

    /// Number of queued remote candidates
    pub fn queued_candidates(&self) -> usize {
        self.queued_remote_candidates.len()
    }

    /// Seconds spent `Connected`, if the call ever got there
    pub fn duration_secs(&self) -> Option<u64> {
        self.connected_at
            .map(|at| Utc::now().signed_duration_since(at).num_seconds().max(0) as u64)
    }

    /// When the call was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Terminate the call; returns its connected duration
    pub fn end(&mut self) -> Option<u64> {
        self.state = CallState::Ended;
        self.duration_secs()
    }

    /// Read-only view
    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.call_id.clone(),
            direction: self.direction,
            peer_uri: self.peer_uri.clone(),
            state: self.state,
        }
    }
}
