use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::webrtc::config::WebRtcConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Media file settings
    pub media: MediaConfig,
    /// Delivery cadence settings
    pub pacing: PacingConfig,
    /// Peer connection settings
    pub webrtc: WebRtcConfig,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8082,
        }
    }
}

/// Media directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory holding the playable files
    pub dir: String,
    /// Video file used when a trigger does not name one
    pub video_file: String,
    /// Audio file used when a trigger does not name one
    pub audio_file: String,
    /// Hold pipelines until the peer connection reports `connected`
    pub wait_for_connected: bool,
    /// Verify the CRC of every Ogg page
    pub verify_ogg_checksum: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: "videos".to_string(),
            video_file: "output.ivf".to_string(),
            audio_file: "output.ogg".to_string(),
            wait_for_connected: true,
            verify_ogg_checksum: true,
        }
    }
}

impl MediaConfig {
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }
}

/// Pacing configuration
///
/// Video samples are paced by a clock derived from the IVF timebase, but the
/// duration *announced* to the track is a separate value. It drives the RTP
/// timestamp increment and is only cosmetic for delivery cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Fixed audio page interval
    pub audio_page_ms: u64,
    /// Sample rate assumed for Ogg granule positions
    pub audio_sample_rate: u32,
    /// Duration announced with every video frame.
    /// `None` announces the clock period itself.
    pub video_announced_duration_ms: Option<u64>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            audio_page_ms: 20,
            audio_sample_rate: 48000,
            video_announced_duration_ms: None,
        }
    }
}

impl PacingConfig {
    pub fn audio_page_interval(&self) -> Duration {
        Duration::from_millis(self.audio_page_ms)
    }

    /// Duration to announce for each video frame given the clock period
    pub fn video_announced_duration(&self, tick_period: Duration) -> Duration {
        self.video_announced_duration_ms
            .map(Duration::from_millis)
            .unwrap_or(tick_period)
    }
}
