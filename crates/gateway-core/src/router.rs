//! Inbound event routing
//!
//! [`route`] turns one parsed [`InboundMessage`] into a [`Route`] addressed to the
//! session lifecycle, the registration machine or the call machine. Responses are
//! matched to their request through the [`TransactionTracker`]; for a response whose
//! transaction is unknown the payload shape decides (a success without a session
//! scope answers `create`, one with a scope answers `attach`).
//!
//! Unknown message kinds and plugin events are logged and ignored.

use tracing::{debug, trace, warn};

use crate::events::MediaStatus;
use crate::protocol::{IceCandidate, InboundMessage, SessionDescription, SipEvent};
use crate::transport::{TransactionKind, TransactionTracker};

/// Where an inbound message goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `create` succeeded
    SessionCreated {
        /// New session id
        session_id: u64,
    },
    /// `attach` succeeded
    HandleAttached {
        /// New handle id
        handle_id: u64,
    },
    /// The gateway accepted a request; nothing to do
    Acknowledged {
        /// What the request was for, if known
        kind: Option<TransactionKind>,
    },
    /// The gateway refused a request at the envelope level
    RequestFailed {
        /// What the request was for, if known
        kind: Option<TransactionKind>,
        /// Gateway error code
        code: Option<u16>,
        /// Gateway reason
        reason: String,
    },
    /// Input for the registration machine
    Registration(RegistrationUpdate),
    /// Input for the call machine
    Call(CallUpdate),
    /// Remote ICE candidate, `None` at end of candidates
    RemoteCandidate(Option<IceCandidate>),
    /// Media-plane notification
    Media(MediaStatus),
    /// The gateway dropped the session or the handle
    SessionLost {
        /// What happened
        reason: String,
    },
    /// Nothing to do
    Ignored,
}

/// Registration machine input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationUpdate {
    /// Binding accepted
    Registered,
    /// Binding refused
    Failed {
        /// SIP or plugin error code
        code: Option<u16>,
        /// Reason text
        reason: String,
    },
    /// Binding removed
    Unregistered,
}

/// Call machine input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallUpdate {
    /// Gateway call id
    pub call_id: Option<String>,
    /// Description carried by the event
    pub jsep: Option<SessionDescription>,
    /// What happened
    pub signal: CallSignal,
}

/// What happened to the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSignal {
    /// Incoming INVITE
    Incoming {
        /// Caller SIP URI
        caller: String,
        /// Caller display name
        display_name: Option<String>,
    },
    /// Our INVITE left the gateway
    Calling,
    /// 180
    Ringing,
    /// Other provisional response
    Proceeding {
        /// Status code
        code: Option<u16>,
    },
    /// 183 with early media
    Progress,
    /// 200 OK
    Accepted,
    /// re-INVITE
    Updating,
    /// The remote side or the gateway ended the call
    Hangup {
        /// SIP status code
        code: Option<u16>,
        /// Reason phrase
        reason: Option<String>,
    },
    /// The plugin refused a call request
    Failed {
        /// Plugin error code
        code: Option<u16>,
        /// Plugin error text
        reason: String,
    },
}

/// Classify one inbound message, completing its transaction when it is a final answer
pub fn route(tracker: &mut TransactionTracker, message: InboundMessage) -> Route {
    match message {
        InboundMessage::Success {
            transaction,
            session_id,
            id,
        } => {
            let kind = transaction.as_deref().and_then(|tx| tracker.complete(tx));
            route_success(kind, session_id, id)
        }
        InboundMessage::Error {
            transaction,
            code,
            reason,
        } => {
            let kind = transaction.as_deref().and_then(|tx| tracker.complete(tx));
            Route::RequestFailed { kind, code, reason }
        }
        InboundMessage::Ack { transaction } => {
            let kind = transaction.as_deref().and_then(|tx| tracker.acknowledge(tx));
            trace!(transaction = ?transaction, ?kind, "Request acknowledged");
            Route::Acknowledged { kind }
        }
        InboundMessage::PluginError {
            transaction,
            code,
            reason,
        } => {
            let kind = transaction.as_deref().and_then(|tx| tracker.complete(tx));
            route_plugin_error(kind, code, reason)
        }
        InboundMessage::PluginEvent {
            transaction,
            call_id,
            event,
            jsep,
        } => {
            if let Some(tx) = transaction.as_deref() {
                tracker.complete(tx);
            }
            route_plugin_event(call_id, event, jsep)
        }
        InboundMessage::Trickle { candidate } => Route::RemoteCandidate(candidate),
        InboundMessage::WebrtcUp => Route::Media(MediaStatus::WebrtcUp),
        InboundMessage::Media { kind, receiving } => Route::Media(MediaStatus::Receiving { kind, receiving }),
        InboundMessage::SlowLink { uplink } => Route::Media(MediaStatus::SlowLink { uplink }),
        InboundMessage::PeerHangup { reason } => Route::Media(MediaStatus::PeerConnectionClosed { reason }),
        InboundMessage::Detached => Route::SessionLost {
            reason: "SIP plugin handle detached".to_string(),
        },
        InboundMessage::SessionTimeout => Route::SessionLost {
            reason: "gateway session timed out".to_string(),
        },
        InboundMessage::Unknown(kind) => {
            debug!(kind = %kind, "Ignoring unknown message kind");
            Route::Ignored
        }
    }
}

fn route_success(kind: Option<TransactionKind>, session_id: Option<u64>, id: Option<u64>) -> Route {
    match (kind, id) {
        (Some(TransactionKind::CreateSession), Some(id)) => Route::SessionCreated { session_id: id },
        (Some(TransactionKind::AttachHandle), Some(id)) => Route::HandleAttached { handle_id: id },
        (Some(kind), None) if kind.is_bootstrap() => Route::RequestFailed {
            kind: Some(kind),
            code: None,
            reason: "success response without an id".to_string(),
        },
        (Some(kind), _) => Route::Acknowledged { kind: Some(kind) },
        // Unknown transaction: fall back to the payload shape
        (None, Some(id)) if session_id.is_none() => Route::SessionCreated { session_id: id },
        (None, Some(id)) => Route::HandleAttached { handle_id: id },
        (None, None) => Route::Acknowledged { kind: None },
    }
}

fn route_plugin_error(kind: Option<TransactionKind>, code: Option<u16>, reason: String) -> Route {
    match kind {
        Some(TransactionKind::Register) => Route::Registration(RegistrationUpdate::Failed { code, reason }),
        Some(kind) if kind.is_call_scoped() => Route::Call(CallUpdate {
            call_id: None,
            jsep: None,
            signal: CallSignal::Failed { code, reason },
        }),
        _ => {
            warn!(?kind, code = ?code, reason = %reason, "SIP plugin error");
            Route::Ignored
        }
    }
}

fn route_plugin_event(
    call_id: Option<String>,
    event: SipEvent,
    jsep: Option<SessionDescription>,
) -> Route {
    let signal = match event {
        SipEvent::Registered { .. } => return Route::Registration(RegistrationUpdate::Registered),
        SipEvent::RegistrationFailed { code, reason } => {
            return Route::Registration(RegistrationUpdate::Failed { code, reason });
        }
        SipEvent::Unregistered => return Route::Registration(RegistrationUpdate::Unregistered),
        SipEvent::Registering | SipEvent::Unregistering => {
            trace!(?event, "Registration in progress");
            return Route::Ignored;
        }
        SipEvent::Other(name) => {
            debug!(event = %name, "Ignoring unknown SIP plugin event");
            return Route::Ignored;
        }
        SipEvent::IncomingCall {
            caller,
            display_name,
        } => CallSignal::Incoming {
            caller,
            display_name,
        },
        SipEvent::Calling => CallSignal::Calling,
        SipEvent::Ringing => CallSignal::Ringing,
        SipEvent::Proceeding { code } => CallSignal::Proceeding { code },
        SipEvent::Progress => CallSignal::Progress,
        SipEvent::Accepted => CallSignal::Accepted,
        SipEvent::UpdatingCall => CallSignal::Updating,
        SipEvent::Hangup { code, reason } => CallSignal::Hangup { code, reason },
    };
    Route::Call(CallUpdate {
        call_id,
        jsep,
        signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::Instant;

    fn parse(value: serde_json::Value) -> InboundMessage {
        InboundMessage::from_value(value).unwrap()
    }

    #[test]
    fn test_success_routed_by_transaction_kind() {
        let mut tracker = TransactionTracker::new();
        let now = Instant::now();
        tracker.insert("c".into(), TransactionKind::CreateSession, now);
        tracker.insert("a".into(), TransactionKind::AttachHandle, now);

        // Both carry a session scope; only the transaction tells them apart
        let attach = parse(json!({"janus": "success", "transaction": "a", "session_id": 7, "data": {"id": 9}}));
        let create = parse(json!({"janus": "success", "transaction": "c", "session_id": 7, "data": {"id": 7}}));

        assert_eq!(route(&mut tracker, attach), Route::HandleAttached { handle_id: 9 });
        assert_eq!(route(&mut tracker, create), Route::SessionCreated { session_id: 7 });
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn test_unknown_transaction_falls_back_to_shape() {
        let mut tracker = TransactionTracker::new();
        let create = parse(json!({"janus": "success", "transaction": "x", "data": {"id": 5}}));
        let attach = parse(json!({"janus": "success", "transaction": "y", "session_id": 5, "data": {"id": 6}}));

        assert_eq!(route(&mut tracker, create), Route::SessionCreated { session_id: 5 });
        assert_eq!(route(&mut tracker, attach), Route::HandleAttached { handle_id: 6 });
    }

    #[test]
    fn test_plugin_error_correlation() {
        let mut tracker = TransactionTracker::new();
        let now = Instant::now();
        tracker.insert("r".into(), TransactionKind::Register, now);
        tracker.insert("c".into(), TransactionKind::Call, now);

        let error = |tx: &str| {
            parse(json!({
                "janus": "event", "transaction": tx, "sender": 9,
                "plugindata": {"plugin": "janus.plugin.sip", "data": {"sip": "event", "error_code": 446, "error": "Missing element"}}
            }))
        };

        assert_eq!(
            route(&mut tracker, error("r")),
            Route::Registration(RegistrationUpdate::Failed { code: Some(446), reason: "Missing element".into() })
        );
        assert!(matches!(
            route(&mut tracker, error("c")),
            Route::Call(CallUpdate { signal: CallSignal::Failed { code: Some(446), .. }, .. })
        ));
        assert_eq!(route(&mut tracker, error("gone")), Route::Ignored);
    }

    #[test]
    fn test_unknown_kinds_are_ignored() {
        let mut tracker = TransactionTracker::new();
        assert_eq!(route(&mut tracker, parse(json!({"janus": "server_info"}))), Route::Ignored);

        let event = parse(json!({
            "janus": "event", "sender": 9,
            "plugindata": {"plugin": "janus.plugin.sip", "data": {"sip": "event", "result": {"event": "messagedelivery"}}}
        }));
        assert_eq!(route(&mut tracker, event), Route::Ignored);
    }

    #[test]
    fn test_timeout_and_detached_lose_the_session() {
        let mut tracker = TransactionTracker::new();
        assert!(matches!(
            route(&mut tracker, parse(json!({"janus": "timeout", "session_id": 1}))),
            Route::SessionLost { .. }
        ));
        assert!(matches!(
            route(&mut tracker, parse(json!({"janus": "detached", "session_id": 1, "sender": 2}))),
            Route::SessionLost { .. }
        ));
    }
}
