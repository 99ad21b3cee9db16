pub mod config;
pub mod media;

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::state::AppState;
use crate::webrtc::{PlaybackSettings, SessionDescription, SessionStatus};

pub use config::{
    get_all_config, get_media_config, get_pacing_config, get_webrtc_config, update_media_config,
    update_pacing_config, update_webrtc_config,
};
pub use media::{list_media, media_exists};

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Signaling & Playback
// ============================================================================

/// Offer in, answer out. No media is started.
///
/// The body is read raw so that every decoding problem maps to
/// `MalformedOffer` instead of an extractor rejection.
pub async fn signal(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<SessionDescription>> {
    let session = state.sessions.current().await?;
    let answer = session.negotiate(&body).await?;
    Ok(Json(answer))
}

/// Media trigger query
#[derive(Debug, Deserialize)]
pub struct PlayQuery {
    /// File stem selecting `<name>.ivf` / `<name>.ogg`
    pub name: Option<String>,
}

/// Negotiate and start streaming the selected media
pub async fn play_video(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlayQuery>,
    body: Bytes,
) -> Result<Json<SessionDescription>> {
    let media = state.library().resolve(query.name.as_deref()).await?;
    info!(
        "Playback requested: video={:?} audio={:?}",
        media.video, media.audio
    );

    let settings = PlaybackSettings::from_config(&state.config.get());
    let session = state.sessions.current().await?;
    let answer = session.play(&body, media, settings).await?;
    Ok(Json(answer))
}

// ============================================================================
// Session
// ============================================================================

pub async fn session_status(State(state): State<Arc<AppState>>) -> Result<Json<SessionStatus>> {
    let session = state.sessions.current().await?;
    Ok(Json(session.status()))
}

/// Close the current session and create a fresh one
pub async fn session_reset(State(state): State<Arc<AppState>>) -> Result<Json<SessionStatus>> {
    let session = state.sessions.reset().await?;
    Ok(Json(session.status()))
}
