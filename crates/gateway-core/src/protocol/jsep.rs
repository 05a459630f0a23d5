//! Session descriptions and ICE candidates as they travel on the control channel
//!
//! Both are opaque to the signaling layer: only the description type and the
//! verbatim text matter, and they are passed unmodified between the gateway and the
//! media engine.

use serde::{Deserialize, Serialize};

/// Offer or answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Initial proposal
    Offer,
    /// Response to an offer
    Answer,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// A session description (`jsep` on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP text, never inspected
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Whether this is an offer
    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// One ICE candidate, symmetric for local and remote candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Media stream identification tag
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    /// Index of the m-line the candidate belongs to
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub media_line_index: Option<u16>,
    /// Candidate attribute text
    #[serde(rename = "candidate")]
    pub candidate_text: String,
}

impl IceCandidate {
    /// Create a candidate for m-line `index` tagged `mid`
    pub fn new(mid: impl Into<String>, index: u16, text: impl Into<String>) -> Self {
        Self {
            media_id: Some(mid.into()),
            media_line_index: Some(index),
            candidate_text: text.into(),
        }
    }
}

/// Payload of a trickle message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrickleCandidate {
    /// A gathered candidate
    Candidate(IceCandidate),
    /// End of candidates
    Completed {
        /// Always `true` on the wire
        completed: bool,
    },
}

impl TrickleCandidate {
    /// The end-of-candidates marker
    pub fn completed() -> Self {
        TrickleCandidate::Completed { completed: true }
    }
}
