//! WebRTC configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// WebRTC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
    /// Upper bound on ICE candidate gathering (ms)
    pub gathering_timeout_ms: u64,
    /// Media stream id shared by the video and audio tracks
    pub stream_id: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            // Empty STUN servers for local connections - host candidates work directly
            stun_servers: vec![],
            turn_servers: vec![],
            gathering_timeout_ms: 5000,
            stream_id: "rtc-playout".to_string(),
        }
    }
}

impl WebRtcConfig {
    pub fn gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.gathering_timeout_ms)
    }

    /// Build the ICE server list handed to the peer connection
    pub fn ice_servers(&self) -> Vec<RTCIceServer> {
        let mut servers = Vec::new();

        if !self.stun_servers.is_empty() {
            servers.push(RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            });
        }

        for turn in &self.turn_servers {
            if turn.urls.is_empty() {
                continue;
            }
            servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        servers
    }
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs; several allow UDP/TCP fallback
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}
