//! Inbound frame parsing
//!
//! Every text frame from the gateway is a JSON object whose `janus` field names the
//! message kind. SIP plugin events nest one level deeper under
//! `plugindata.data.result.event`. Kinds and plugin events this client does not know
//! are preserved by name so the router can log them and move on.

use serde::Deserialize;
use serde_json::Value;

use super::jsep::{IceCandidate, SessionDescription, TrickleCandidate};
use crate::error::{GatewayError, GatewayResult};

/// Events reported by the SIP plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipEvent {
    /// REGISTER sent, waiting for the registrar
    Registering,
    /// Registrar accepted the binding
    Registered {
        /// Identity that was registered
        username: Option<String>,
    },
    /// Registrar refused the binding
    RegistrationFailed {
        /// SIP status code
        code: Option<u16>,
        /// Reason phrase
        reason: String,
    },
    /// Unregister sent
    Unregistering,
    /// Binding removed
    Unregistered,
    /// INVITE sent
    Calling,
    /// Incoming INVITE
    IncomingCall {
        /// Caller SIP URI
        caller: String,
        /// Caller display name
        display_name: Option<String>,
    },
    /// 180 Ringing
    Ringing,
    /// 1xx other than 180 and 183
    Proceeding {
        /// Provisional status code
        code: Option<u16>,
    },
    /// 183 Session Progress (early media)
    Progress,
    /// 200 OK to our INVITE, or confirmation of our accept
    Accepted,
    /// re-INVITE received
    UpdatingCall,
    /// Call is over
    Hangup {
        /// SIP status code
        code: Option<u16>,
        /// Reason phrase
        reason: Option<String>,
    },
    /// Any event name this client does not handle
    Other(String),
}

/// One parsed inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Synchronous success; `data.id` carries a new session or handle id
    Success {
        /// Echoed transaction
        transaction: Option<String>,
        /// Session scope of the response, absent for `create`
        session_id: Option<u64>,
        /// `data.id`
        id: Option<u64>,
    },
    /// Request failed at the gateway level
    Error {
        /// Echoed transaction
        transaction: Option<String>,
        /// Gateway error code
        code: Option<u16>,
        /// Gateway reason
        reason: String,
    },
    /// Asynchronous request accepted
    Ack {
        /// Echoed transaction
        transaction: Option<String>,
    },
    /// SIP plugin event
    PluginEvent {
        /// Echoed transaction, present when the event answers a request
        transaction: Option<String>,
        /// Gateway call id
        call_id: Option<String>,
        /// Event
        event: SipEvent,
        /// Description attached to the event
        jsep: Option<SessionDescription>,
    },
    /// SIP plugin refused a request
    PluginError {
        /// Echoed transaction
        transaction: Option<String>,
        /// Plugin error code
        code: Option<u16>,
        /// Plugin error text
        reason: String,
    },
    /// Remote ICE candidate, `None` at end of candidates
    Trickle {
        /// Candidate
        candidate: Option<IceCandidate>,
    },
    /// PeerConnection between gateway and client is up
    WebrtcUp,
    /// Gateway started or stopped receiving media
    Media {
        /// Media kind ("audio")
        kind: Option<String>,
        /// Whether media is flowing
        receiving: bool,
    },
    /// Gateway closed its PeerConnection
    PeerHangup {
        /// Reason reported by the gateway
        reason: Option<String>,
    },
    /// Gateway reports packet loss
    SlowLink {
        /// Whether the loss is on the uplink
        uplink: bool,
    },
    /// Plugin handle was detached
    Detached,
    /// Session expired
    SessionTimeout,
    /// A kind this client does not recognize
    Unknown(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct PluginData {
    #[serde(default)]
    data: Value,
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

fn code_field(value: &Value, key: &str) -> Option<u16> {
    u64_field(value, key).and_then(|c| u16::try_from(c).ok())
}

impl InboundMessage {
    /// Parse one text frame
    pub fn parse(frame: &str) -> GatewayResult<Self> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| GatewayError::protocol(format!("Frame is not JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Classify an already decoded frame
    pub fn from_value(value: Value) -> GatewayResult<Self> {
        let kind = value
            .get("janus")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::protocol("Frame has no 'janus' field"))?
            .to_string();
        let transaction = str_field(&value, "transaction");

        let message = match kind.as_str() {
            "success" => InboundMessage::Success {
                transaction,
                session_id: u64_field(&value, "session_id"),
                id: value.get("data").and_then(|d| u64_field(d, "id")),
            },
            "error" => {
                let body: ErrorBody = value
                    .get("error")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| GatewayError::protocol(format!("Malformed error body: {}", e)))?
                    .unwrap_or(ErrorBody { code: None, reason: "unknown error".to_string() });
                InboundMessage::Error {
                    transaction,
                    code: body.code,
                    reason: body.reason,
                }
            }
            "ack" => InboundMessage::Ack { transaction },
            "event" => Self::plugin_event(&value, transaction)?,
            "trickle" => {
                let candidate = value
                    .get("candidate")
                    .cloned()
                    .ok_or_else(|| GatewayError::protocol("Trickle without candidate"))?;
                let candidate: TrickleCandidate = serde_json::from_value(candidate)
                    .map_err(|e| GatewayError::protocol(format!("Malformed candidate: {}", e)))?;
                InboundMessage::Trickle {
                    candidate: match candidate {
                        TrickleCandidate::Candidate(c) => Some(c),
                        TrickleCandidate::Completed { .. } => None,
                    },
                }
            }
            "webrtcup" => InboundMessage::WebrtcUp,
            "media" => InboundMessage::Media {
                kind: str_field(&value, "type"),
                receiving: value.get("receiving").and_then(Value::as_bool).unwrap_or(false),
            },
            "hangup" => InboundMessage::PeerHangup {
                reason: str_field(&value, "reason"),
            },
            "slowlink" => InboundMessage::SlowLink {
                uplink: value.get("uplink").and_then(Value::as_bool).unwrap_or(false),
            },
            "detached" => InboundMessage::Detached,
            "timeout" => InboundMessage::SessionTimeout,
            _ => InboundMessage::Unknown(kind),
        };
        Ok(message)
    }

    fn plugin_event(value: &Value, transaction: Option<String>) -> GatewayResult<Self> {
        let plugindata: PluginData = value
            .get("plugindata")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| GatewayError::protocol(format!("Malformed plugindata: {}", e)))?
            .ok_or_else(|| GatewayError::protocol("Event without plugindata"))?;
        let data = plugindata.data;

        if data.get("error_code").is_some() || data.get("error").is_some() {
            return Ok(InboundMessage::PluginError {
                transaction,
                code: code_field(&data, "error_code"),
                reason: str_field(&data, "error").unwrap_or_else(|| "unknown plugin error".into()),
            });
        }

        let result = data
            .get("result")
            .ok_or_else(|| GatewayError::protocol("Plugin event without result"))?;
        let name = str_field(result, "event")
            .ok_or_else(|| GatewayError::protocol("Plugin result without event name"))?;

        let event = match name.as_str() {
            "registering" => SipEvent::Registering,
            "registered" => SipEvent::Registered {
                username: str_field(result, "username"),
            },
            "registration_failed" => SipEvent::RegistrationFailed {
                code: code_field(result, "code"),
                reason: str_field(result, "reason").unwrap_or_default(),
            },
            "unregistering" => SipEvent::Unregistering,
            "unregistered" => SipEvent::Unregistered,
            "calling" => SipEvent::Calling,
            "incomingcall" => SipEvent::IncomingCall {
                caller: str_field(result, "username").unwrap_or_default(),
                display_name: str_field(result, "displayname"),
            },
            "ringing" => SipEvent::Ringing,
            "proceeding" => SipEvent::Proceeding {
                code: code_field(result, "code"),
            },
            "progress" => SipEvent::Progress,
            "accepted" => SipEvent::Accepted,
            "updatingcall" => SipEvent::UpdatingCall,
            "hangup" => SipEvent::Hangup {
                code: code_field(result, "code"),
                reason: str_field(result, "reason"),
            },
            _ => SipEvent::Other(name),
        };

        let jsep = value
            .get("jsep")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| GatewayError::protocol(format!("Malformed jsep: {}", e)))?;

        Ok(InboundMessage::PluginEvent {
            transaction,
            call_id: str_field(&data, "call_id"),
            event,
            jsep,
        })
    }

    /// Transaction echoed by the frame, if any
    pub fn transaction(&self) -> Option<&str> {
        match self {
            InboundMessage::Success { transaction, .. }
            | InboundMessage::Error { transaction, .. }
            | InboundMessage::Ack { transaction }
            | InboundMessage::PluginEvent { transaction, .. }
            | InboundMessage::PluginError { transaction, .. } => transaction.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::jsep::SdpType;
    use serde_json::json;

    #[test]
    fn test_success_shapes() {
        let create = InboundMessage::from_value(json!({
            "janus": "success", "transaction": "a", "data": {"id": 4242}
        }))
        .unwrap();
        assert_eq!(
            create,
            InboundMessage::Success { transaction: Some("a".into()), session_id: None, id: Some(4242) }
        );

        let attach = InboundMessage::from_value(json!({
            "janus": "success", "session_id": 4242, "transaction": "b", "data": {"id": 77}
        }))
        .unwrap();
        assert!(matches!(attach, InboundMessage::Success { session_id: Some(4242), id: Some(77), .. }));
    }

    #[test]
    fn test_gateway_error() {
        let message = InboundMessage::parse(
            r#"{"janus":"error","transaction":"t","error":{"code":458,"reason":"No such session"}}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            InboundMessage::Error {
                transaction: Some("t".into()),
                code: Some(458),
                reason: "No such session".into()
            }
        );
    }

    #[test]
    fn test_incoming_call_event_with_offer() {
        let message = InboundMessage::from_value(json!({
            "janus": "event",
            "session_id": 1,
            "sender": 2,
            "plugindata": {
                "plugin": "janus.plugin.sip",
                "data": {
                    "sip": "event",
                    "call_id": "abc@host",
                    "result": {"event": "incomingcall", "username": "sip:carol@example.com", "displayname": "Carol"}
                }
            },
            "jsep": {"type": "offer", "sdp": "v=0 carol"}
        }))
        .unwrap();

        match message {
            InboundMessage::PluginEvent { call_id, event, jsep, .. } => {
                assert_eq!(call_id.as_deref(), Some("abc@host"));
                assert_eq!(
                    event,
                    SipEvent::IncomingCall {
                        caller: "sip:carol@example.com".into(),
                        display_name: Some("Carol".into())
                    }
                );
                assert_eq!(jsep.unwrap().sdp_type, SdpType::Offer);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_registration_failed_and_plugin_error() {
        let failed = InboundMessage::from_value(json!({
            "janus": "event",
            "plugindata": {"data": {"sip": "event", "result": {
                "event": "registration_failed", "code": 403, "reason": "Forbidden"
            }}}
        }))
        .unwrap();
        assert!(matches!(
            failed,
            InboundMessage::PluginEvent {
                event: SipEvent::RegistrationFailed { code: Some(403), .. },
                ..
            }
        ));

        let error = InboundMessage::from_value(json!({
            "janus": "event",
            "transaction": "r1",
            "plugindata": {"data": {"sip": "event", "error_code": 446, "error": "Missing element (username)"}}
        }))
        .unwrap();
        assert_eq!(error.transaction(), Some("r1"));
        assert!(matches!(error, InboundMessage::PluginError { code: Some(446), .. }));
    }

    #[test]
    fn test_unknown_kinds_and_events_are_preserved() {
        let unknown = InboundMessage::from_value(json!({"janus": "server_info"})).unwrap();
        assert_eq!(unknown, InboundMessage::Unknown("server_info".into()));

        let other = InboundMessage::from_value(json!({
            "janus": "event",
            "plugindata": {"data": {"sip": "event", "result": {"event": "messagedelivery"}}}
        }))
        .unwrap();
        assert!(matches!(other, InboundMessage::PluginEvent { event: SipEvent::Other(name), .. } if name == "messagedelivery"));
    }

    #[test]
    fn test_trickle_and_malformed_frames() {
        let trickle = InboundMessage::from_value(json!({
            "janus": "trickle",
            "candidate": {"sdpMid": "audio", "sdpMLineIndex": 0, "candidate": "candidate:9 1 udp 5 198.51.100.7 4000 typ relay"}
        }))
        .unwrap();
        assert!(matches!(trickle, InboundMessage::Trickle { candidate: Some(_) }));

        let done = InboundMessage::from_value(json!({"janus": "trickle", "candidate": {"completed": true}})).unwrap();
        assert_eq!(done, InboundMessage::Trickle { candidate: None });

        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse(r#"{"transaction":"x"}"#).is_err());
        assert!(InboundMessage::parse(r#"{"janus":"event","plugindata":{"data":{}}}"#).is_err());
    }
}
