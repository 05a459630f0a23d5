//! Outbound request envelopes

use serde::Serialize;

use super::jsep::{SessionDescription, TrickleCandidate};

/// Top-level request verb (`janus` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// Create a session
    Create,
    /// Attach a plugin handle to the session
    Attach,
    /// Plugin message carrying a SIP request body
    Message,
    /// ICE trickle
    Trickle,
    /// Session liveness
    Keepalive,
    /// Destroy the session
    Destroy,
}

/// SIP plugin request body, tagged by `request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum SipRequest {
    /// REGISTER with the configured registrar
    Register {
        /// Public identity as a SIP URI
        username: String,
        /// Digest secret
        #[serde(skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
        /// Display name for the From header
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        /// Outbound proxy / registrar as a SIP URI
        #[serde(skip_serializing_if = "Option::is_none")]
        proxy: Option<String>,
    },
    /// REGISTER with expires 0
    Unregister,
    /// INVITE `uri`, the offer travels in `jsep`
    Call {
        /// Callee SIP URI
        uri: String,
    },
    /// Answer an incoming INVITE, the answer travels in `jsep`
    Accept,
    /// Refuse an incoming INVITE
    Decline {
        /// SIP response code, the gateway defaults to 486
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
    /// BYE / CANCEL the current call
    Hangup,
    /// Reply to a re-INVITE with a fresh description
    Update,
}

impl SipRequest {
    /// Request name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            SipRequest::Register { .. } => "register",
            SipRequest::Unregister => "unregister",
            SipRequest::Call { .. } => "call",
            SipRequest::Accept => "accept",
            SipRequest::Decline { .. } => "decline",
            SipRequest::Hangup => "hangup",
            SipRequest::Update => "update",
        }
    }
}

/// One outbound control-channel message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    /// Verb
    pub janus: Verb,
    /// Correlation id echoed by the gateway
    pub transaction: String,
    /// Session scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    /// Plugin handle scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<u64>,
    /// Plugin package, attach only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// SIP request body, message only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<SipRequest>,
    /// Session description riding along a message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsep: Option<SessionDescription>,
    /// Trickle payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<TrickleCandidate>,
}

impl Request {
    fn bare(janus: Verb, transaction: String) -> Self {
        Self {
            janus,
            transaction,
            session_id: None,
            handle_id: None,
            plugin: None,
            body: None,
            jsep: None,
            candidate: None,
        }
    }

    /// `create` a new session
    pub fn create(transaction: String) -> Self {
        Self::bare(Verb::Create, transaction)
    }

    /// `attach` `plugin` inside `session_id`
    pub fn attach(transaction: String, session_id: u64, plugin: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id),
            plugin: Some(plugin.into()),
            ..Self::bare(Verb::Attach, transaction)
        }
    }

    /// Session `keepalive`
    pub fn keepalive(transaction: String, session_id: u64) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::bare(Verb::Keepalive, transaction)
        }
    }

    /// `destroy` the session
    pub fn destroy(transaction: String, session_id: u64) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::bare(Verb::Destroy, transaction)
        }
    }

    /// Plugin `message` with an optional description
    pub fn message(
        transaction: String,
        session_id: u64,
        handle_id: u64,
        body: SipRequest,
        jsep: Option<SessionDescription>,
    ) -> Self {
        Self {
            session_id: Some(session_id),
            handle_id: Some(handle_id),
            body: Some(body),
            jsep,
            ..Self::bare(Verb::Message, transaction)
        }
    }

    /// `trickle` one candidate or the end-of-candidates marker
    pub fn trickle(
        transaction: String,
        session_id: u64,
        handle_id: u64,
        candidate: TrickleCandidate,
    ) -> Self {
        Self {
            session_id: Some(session_id),
            handle_id: Some(handle_id),
            candidate: Some(candidate),
            ..Self::bare(Verb::Trickle, transaction)
        }
    }

    /// Whether the request is scoped to the SIP plugin handle
    pub fn is_handle_scoped(&self) -> bool {
        matches!(self.janus, Verb::Message | Verb::Trickle)
    }
}

/// Prefix `sip:` onto identities and proxies given without a scheme
pub fn normalize_sip_uri(uri: &str) -> String {
    let uri = uri.trim();
    if uri.starts_with("sip:") || uri.starts_with("sips:") {
        uri.to_string()
    } else {
        format!("sip:{}", uri)
    }
}
