use axum::{
    extract::{Path as AxumPath, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::media::MediaEntry;
use crate::state::AppState;

/// Media directory listing
#[derive(Serialize)]
pub struct MediaListing {
    pub title: String,
    pub videos: Vec<MediaEntry>,
}

pub async fn list_media(State(state): State<Arc<AppState>>) -> Result<Json<MediaListing>> {
    let library = state.library();
    let videos = library.list().await.map_err(|e| match e {
        AppError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            AppError::MediaNotFound(library.dir().display().to_string())
        }
        other => other,
    })?;

    Ok(Json(MediaListing {
        title: "Media".to_string(),
        videos,
    }))
}

#[derive(Serialize)]
pub struct MediaPresence {
    pub name: String,
    pub exists: bool,
}

/// Existence check for one file in the media directory
pub async fn media_exists(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Result<Json<MediaPresence>> {
    if !state.library().exists(&name).await? {
        return Err(AppError::MediaNotFound(name));
    }
    Ok(Json(MediaPresence { name, exists: true }))
}
