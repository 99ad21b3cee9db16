//! WebRTC signaling types
//!
//! Session descriptions travel as browser-style JSON:
//! `{ "type": "offer", "sdp": "v=0\r\n..." }`.

use serde::{Deserialize, Serialize};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::{AppError, Result};

/// Description type as used by `RTCSessionDescriptionInit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl From<RTCSdpType> for SdpType {
    fn from(t: RTCSdpType) -> Self {
        match t {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Pranswer => SdpType::Pranswer,
            RTCSdpType::Rollback => SdpType::Rollback,
            // Unspecified never leaves a committed local description
            RTCSdpType::Answer | RTCSdpType::Unspecified => SdpType::Answer,
        }
    }
}

/// JSON session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// Number of ICE candidates embedded in the SDP
    pub fn candidate_count(&self) -> usize {
        count_candidates(&self.sdp)
    }
}

impl From<RTCSessionDescription> for SessionDescription {
    fn from(desc: RTCSessionDescription) -> Self {
        Self {
            sdp_type: desc.sdp_type.into(),
            sdp: desc.sdp,
        }
    }
}

/// Decode and validate an offer body
///
/// Checks the JSON envelope, the description type and the SDP grammar. No
/// session state is touched here, so a rejected offer leaves the session
/// exactly as it was.
pub fn parse_offer(body: &[u8]) -> Result<RTCSessionDescription> {
    let desc: SessionDescription = serde_json::from_slice(body)
        .map_err(|e| AppError::MalformedOffer(format!("invalid JSON: {}", e)))?;

    if desc.sdp_type != SdpType::Offer {
        return Err(AppError::MalformedOffer(format!(
            "expected type \"offer\", got {:?}",
            desc.sdp_type
        )));
    }
    if desc.sdp.trim().is_empty() {
        return Err(AppError::MalformedOffer("empty SDP".to_string()));
    }

    RTCSessionDescription::offer(desc.sdp)
        .map_err(|e| AppError::MalformedOffer(format!("invalid SDP: {}", e)))
}

/// Count `a=candidate:` lines in an SDP blob
pub fn count_candidates(sdp: &str) -> usize {
    sdp.lines()
        .filter(|line| line.trim_start().starts_with("a=candidate:"))
        .count()
}

/// Peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Failed and Closed never recover
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::New,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Offer/answer progress of a session
///
/// `Fresh -> Negotiating -> {Negotiated, Broken}`; a failure before the remote
/// description is applied goes back to `Fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationState {
    #[default]
    Fresh,
    Negotiating,
    Negotiated,
    Broken,
}
