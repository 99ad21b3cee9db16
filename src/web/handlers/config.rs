//! Runtime configuration API
//!
//! - GET   /api/config          - whole configuration, TURN secrets blanked
//! - GET   /api/config/media    - media directory settings
//! - PATCH /api/config/media
//! - GET   /api/config/pacing   - delivery cadence settings
//! - PATCH /api/config/pacing
//! - GET   /api/config/webrtc   - peer settings, applied to the next session
//! - PATCH /api/config/webrtc
//!
//! PATCH bodies only carry the fields to change. Accepted changes are
//! persisted when the store has a backing file.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::{AppConfig, MediaConfig, PacingConfig};
use crate::error::{AppError, Result};
use crate::media::library::validate_name;
use crate::state::AppState;
use crate::webrtc::config::{TurnServer, WebRtcConfig};

fn sanitize_webrtc(config: &mut WebRtcConfig) {
    for turn in &mut config.turn_servers {
        turn.username.clear();
        turn.credential.clear();
    }
}

fn sanitize_config_for_api(config: &mut AppConfig) {
    sanitize_webrtc(&mut config.webrtc);
}

/// Whole configuration
pub async fn get_all_config(State(state): State<Arc<AppState>>) -> Json<AppConfig> {
    let mut config = (*state.config.get()).clone();
    sanitize_config_for_api(&mut config);
    Json(config)
}

// ===== Media =====

#[derive(Debug, Deserialize)]
pub struct MediaConfigUpdate {
    pub dir: Option<String>,
    pub video_file: Option<String>,
    pub audio_file: Option<String>,
    pub wait_for_connected: Option<bool>,
    pub verify_ogg_checksum: Option<bool>,
}

impl MediaConfigUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref dir) = self.dir {
            if dir.trim().is_empty() {
                return Err(AppError::BadRequest("Media directory must not be empty".into()));
            }
        }
        for file in [&self.video_file, &self.audio_file].into_iter().flatten() {
            validate_name(file)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, config: &mut MediaConfig) {
        if let Some(ref dir) = self.dir {
            config.dir = dir.clone();
        }
        if let Some(ref file) = self.video_file {
            config.video_file = file.clone();
        }
        if let Some(ref file) = self.audio_file {
            config.audio_file = file.clone();
        }
        if let Some(wait) = self.wait_for_connected {
            config.wait_for_connected = wait;
        }
        if let Some(verify) = self.verify_ogg_checksum {
            config.verify_ogg_checksum = verify;
        }
    }
}

pub async fn get_media_config(State(state): State<Arc<AppState>>) -> Json<MediaConfig> {
    Json(state.config.get().media.clone())
}

pub async fn update_media_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MediaConfigUpdate>,
) -> Result<Json<MediaConfig>> {
    req.validate()?;
    state.config.update(|config| req.apply_to(&mut config.media)).await?;
    Ok(Json(state.config.get().media.clone()))
}

// ===== Pacing =====

/// Rates an Opus stream can be encoded at
const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

#[derive(Debug, Deserialize)]
pub struct PacingConfigUpdate {
    pub audio_page_ms: Option<u64>,
    pub audio_sample_rate: Option<u32>,
    /// 0 goes back to announcing the clock period
    pub video_announced_duration_ms: Option<u64>,
}

impl PacingConfigUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(ms) = self.audio_page_ms {
            if !(1..=1000).contains(&ms) {
                return Err(AppError::BadRequest(format!(
                    "audio_page_ms must be between 1 and 1000, got {}",
                    ms
                )));
            }
        }
        if let Some(rate) = self.audio_sample_rate {
            if !OPUS_SAMPLE_RATES.contains(&rate) {
                return Err(AppError::BadRequest(format!(
                    "audio_sample_rate must be one of {:?}, got {}",
                    OPUS_SAMPLE_RATES, rate
                )));
            }
        }
        if let Some(ms) = self.video_announced_duration_ms {
            if ms > 10_000 {
                return Err(AppError::BadRequest(
                    "video_announced_duration_ms must not exceed 10000".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, config: &mut PacingConfig) {
        if let Some(ms) = self.audio_page_ms {
            config.audio_page_ms = ms;
        }
        if let Some(rate) = self.audio_sample_rate {
            config.audio_sample_rate = rate;
        }
        if let Some(ms) = self.video_announced_duration_ms {
            config.video_announced_duration_ms = if ms == 0 { None } else { Some(ms) };
        }
    }
}

pub async fn get_pacing_config(State(state): State<Arc<AppState>>) -> Json<PacingConfig> {
    Json(state.config.get().pacing.clone())
}

pub async fn update_pacing_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PacingConfigUpdate>,
) -> Result<Json<PacingConfig>> {
    req.validate()?;
    state.config.update(|config| req.apply_to(&mut config.pacing)).await?;
    Ok(Json(state.config.get().pacing.clone()))
}

// ===== WebRTC =====

#[derive(Debug, Deserialize)]
pub struct WebRtcConfigUpdate {
    /// Replaces the whole list; empty clears it
    pub stun_servers: Option<Vec<String>>,
    /// Replaces the whole list; empty clears it
    pub turn_servers: Option<Vec<TurnServer>>,
    pub gathering_timeout_ms: Option<u64>,
    pub stream_id: Option<String>,
}

impl WebRtcConfigUpdate {
    pub fn validate(&self) -> Result<()> {
        for url in self.stun_servers.iter().flatten() {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(AppError::BadRequest(format!(
                    "STUN server must start with 'stun:' or 'stuns:', got {}",
                    url
                )));
            }
        }
        for url in self.turn_servers.iter().flatten().flat_map(|t| &t.urls) {
            if !url.starts_with("turn:") && !url.starts_with("turns:") {
                return Err(AppError::BadRequest(format!(
                    "TURN server must start with 'turn:' or 'turns:', got {}",
                    url
                )));
            }
        }
        if let Some(ms) = self.gathering_timeout_ms {
            if !(100..=60_000).contains(&ms) {
                return Err(AppError::BadRequest(format!(
                    "gathering_timeout_ms must be between 100 and 60000, got {}",
                    ms
                )));
            }
        }
        if let Some(ref id) = self.stream_id {
            if id.trim().is_empty() {
                return Err(AppError::BadRequest("stream_id must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, config: &mut WebRtcConfig) {
        if let Some(ref servers) = self.stun_servers {
            config.stun_servers = servers.clone();
        }
        if let Some(ref servers) = self.turn_servers {
            config.turn_servers = servers.clone();
        }
        if let Some(ms) = self.gathering_timeout_ms {
            config.gathering_timeout_ms = ms;
        }
        if let Some(ref id) = self.stream_id {
            config.stream_id = id.clone();
        }
    }
}

pub async fn get_webrtc_config(State(state): State<Arc<AppState>>) -> Json<WebRtcConfig> {
    let mut config = state.config.get().webrtc.clone();
    sanitize_webrtc(&mut config);
    Json(config)
}

/// Takes effect for the next session; the current one keeps its transport
pub async fn update_webrtc_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WebRtcConfigUpdate>,
) -> Result<Json<WebRtcConfig>> {
    req.validate()?;
    state.config.update(|config| req.apply_to(&mut config.webrtc)).await?;
    Ok(get_webrtc_config(State(state)).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_update() {
        let mut pacing = PacingConfig::default();
        let update = PacingConfigUpdate {
            audio_page_ms: Some(40),
            audio_sample_rate: None,
            video_announced_duration_ms: Some(1000),
        };
        update.validate().unwrap();
        update.apply_to(&mut pacing);
        assert_eq!(pacing.audio_page_ms, 40);
        assert_eq!(pacing.audio_sample_rate, 48000);
        assert_eq!(pacing.video_announced_duration_ms, Some(1000));

        let reset = PacingConfigUpdate {
            audio_page_ms: None,
            audio_sample_rate: None,
            video_announced_duration_ms: Some(0),
        };
        reset.apply_to(&mut pacing);
        assert_eq!(pacing.video_announced_duration_ms, None);
    }

    #[test]
    fn test_pacing_rejects_out_of_range() {
        let zero_page = PacingConfigUpdate {
            audio_page_ms: Some(0),
            audio_sample_rate: None,
            video_announced_duration_ms: None,
        };
        assert!(matches!(zero_page.validate(), Err(AppError::BadRequest(_))));

        let odd_rate = PacingConfigUpdate {
            audio_page_ms: None,
            audio_sample_rate: Some(44100),
            video_announced_duration_ms: None,
        };
        assert!(matches!(odd_rate.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_media_update_rejects_paths() {
        let update: MediaConfigUpdate =
            serde_json::from_str(r#"{"video_file":"../secret.ivf"}"#).unwrap();
        assert!(matches!(update.validate(), Err(AppError::BadRequest(_))));

        let update: MediaConfigUpdate = serde_json::from_str(r#"{"dir":"  "}"#).unwrap();
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_webrtc_update_checks_schemes() {
        let update: WebRtcConfigUpdate =
            serde_json::from_str(r#"{"stun_servers":["turn:example.com:3478"]}"#).unwrap();
        assert!(update.validate().is_err());

        let update: WebRtcConfigUpdate = serde_json::from_str(
            r#"{"turn_servers":[{"urls":["turns:example.com:5349"],"username":"u","credential":"p"}],
                "gathering_timeout_ms":250}"#,
        )
        .unwrap();
        update.validate().unwrap();

        let mut config = WebRtcConfig::default();
        update.apply_to(&mut config);
        assert_eq!(config.gathering_timeout_ms, 250);
        assert_eq!(config.turn_servers[0].credential, "p");
        assert_eq!(config.stun_servers, Vec::<String>::new());
    }

    #[test]
    fn test_sanitize_blanks_turn_secrets() {
        let mut config = AppConfig::default();
        config.webrtc.turn_servers.push(TurnServer {
            urls: vec!["turn:example.com:3478".to_string()],
            username: "user".to_string(),
            credential: "pass".to_string(),
        });
        sanitize_config_for_api(&mut config);
        assert_eq!(config.webrtc.turn_servers[0].urls.len(), 1);
        assert!(config.webrtc.turn_servers[0].username.is_empty());
        assert!(config.webrtc.turn_servers[0].credential.is_empty());
    }
}
