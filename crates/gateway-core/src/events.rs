//! UI notifications
//!
//! The client reports everything a user interface needs through [`ClientEvent`]s
//! on a broadcast channel. Notifications are fire-and-forget: nothing a subscriber
//! does flows back into the state machine, and a client with no subscribers runs
//! exactly the same way.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::call::{CallSession, CallState};
use crate::error::GatewayError;
use crate::media::PeerConnectionState;
use crate::registration::RegistrationState;
use crate::session::SessionState;

/// Which call controls make sense right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallActions {
    /// A new call may be placed
    pub can_call: bool,
    /// An incoming call waits to be answered or declined
    pub can_answer: bool,
    /// There is a call to hang up
    pub can_hangup: bool,
}

impl CallActions {
    /// Actions for the given registration and call
    pub fn derive(registration: &RegistrationState, call: Option<&CallSession>) -> Self {
        let active = call.filter(|c| c.is_active());
        Self {
            can_call: registration.is_registered() && active.is_none(),
            can_answer: active.is_some_and(|c| c.state() == CallState::IncomingOffered),
            can_hangup: active.is_some(),
        }
    }
}

/// Media-plane status reported by the gateway or the media engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaStatus {
    /// The gateway's peer connection is up
    WebrtcUp,
    /// The gateway started or stopped receiving media
    Receiving {
        /// Media kind
        kind: Option<String>,
        /// Whether media is flowing
        receiving: bool,
    },
    /// The gateway reports packet loss
    SlowLink {
        /// Whether the loss is on the uplink
        uplink: bool,
    },
    /// The gateway closed its peer connection
    PeerConnectionClosed {
        /// Reason given by the gateway
        reason: Option<String>,
    },
    /// Local peer connection state change
    Transport(PeerConnectionState),
}

/// Notification for the user interface
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Control channel or session state changed
    ConnectionStatus {
        /// New state
        state: SessionState,
    },
    /// Fatal transport or bootstrap failure; all state was reset
    ConnectionFailed {
        /// What went wrong
        error: GatewayError,
    },
    /// Registration state changed
    RegistrationChanged {
        /// New state
        state: RegistrationState,
    },
    /// An INVITE arrived and waits for `answer` or `decline`
    IncomingCall {
        /// Caller SIP URI
        caller: String,
        /// Caller display name
        display_name: Option<String>,
        /// Gateway call id
        call_id: Option<String>,
    },
    /// The call moved to a new state
    CallStatus {
        /// Remote party
        peer: String,
        /// New state
        state: CallState,
    },
    /// The call is over and its resources are released
    CallEnded {
        /// Reason phrase from the gateway, or a local description
        reason: Option<String>,
        /// SIP status code from the gateway
        code: Option<u16>,
        /// Whether this client ended the call
        locally_initiated: bool,
        /// Seconds the call was connected
        duration_secs: Option<u64>,
    },
    /// A call was refused because another call is active
    CallRefusedBusy {
        /// Peer of the refused call
        peer: String,
    },
    /// Remote media arrived from the media engine
    RemoteMedia {
        /// Engine stream id
        stream_id: String,
    },
    /// Media-plane status
    MediaStatus(MediaStatus),
    /// Availability of the call controls changed
    ActionsChanged(CallActions),
}

impl ClientEvent {
    /// Short human-readable status line
    pub fn status_text(&self) -> String {
        match self {
            ClientEvent::ConnectionStatus { state } => format!("Connection: {}", state),
            ClientEvent::ConnectionFailed { error } => format!("Connection failed: {}", error),
            ClientEvent::RegistrationChanged { state } => format!("Registration: {}", state),
            ClientEvent::IncomingCall { caller, display_name, .. } => match display_name {
                Some(name) => format!("Incoming call from {} <{}>", name, caller),
                None => format!("Incoming call from {}", caller),
            },
            ClientEvent::CallStatus { peer, state } => format!("Call with {}: {}", peer, state),
            ClientEvent::CallEnded { reason, code, .. } => match (code, reason) {
                (Some(code), Some(reason)) => format!("Call ended: {} {}", code, reason),
                (None, Some(reason)) => format!("Call ended: {}", reason),
                (Some(code), None) => format!("Call ended: {}", code),
                (None, None) => "Call ended".to_string(),
            },
            ClientEvent::CallRefusedBusy { peer } => format!("Busy, refused call with {}", peer),
            ClientEvent::RemoteMedia { stream_id } => format!("Remote media: {}", stream_id),
            ClientEvent::MediaStatus(status) => format!("Media: {:?}", status),
            ClientEvent::ActionsChanged(actions) => format!(
                "Actions: call={} answer={} hangup={}",
                actions.can_call, actions.can_answer, actions.can_hangup
            ),
        }
    }
}

/// Broadcast fan-out of [`ClientEvent`]s
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventEmitter {
    /// Create an emitter buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: ClientEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_follow_registration_and_call() {
        let registered = RegistrationState::Registered;
        assert_eq!(
            CallActions::derive(&registered, None),
            CallActions { can_call: true, can_answer: false, can_hangup: false }
        );
        assert!(!CallActions::derive(&RegistrationState::Registering, None).can_call);

        let incoming = CallSession::inbound("sip:carol@example.com", None, None, None);
        assert_eq!(
            CallActions::derive(&registered, Some(&incoming)),
            CallActions { can_call: false, can_answer: true, can_hangup: true }
        );

        let mut ended = CallSession::outbound("sip:bob@example.com");
        ended.end();
        assert!(CallActions::derive(&registered, Some(&ended)).can_call);
    }

    #[tokio::test]
    async fn test_emitter_without_subscribers() {
        let emitter = EventEmitter::new(4);
        emitter.emit(ClientEvent::ConnectionStatus { state: SessionState::Connected });

        let mut rx = emitter.subscribe();
        assert_eq!(emitter.receiver_count(), 1);
        emitter.emit(ClientEvent::CallRefusedBusy { peer: "sip:dave@example.com".into() });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.status_text(), "Busy, refused call with sip:dave@example.com");
    }

    #[test]
    fn test_call_ended_text() {
        let event = ClientEvent::CallEnded {
            reason: Some("Busy Here".into()),
            code: Some(486),
            locally_initiated: false,
            duration_secs: None,
        };
        assert_eq!(event.status_text(), "Call ended: 486 Busy Here");
    }
}
