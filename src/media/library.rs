//! Media library: the directory of playable container files
//!
//! Provides the "list available media" and "does media X exist" operations
//! used by the HTTP layer, and resolves a media name to the video/audio
//! pair a playback request should stream.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::config::MediaConfig;
use crate::error::{AppError, Result};

/// Container kind, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("ivf") => MediaKind::Video,
            Some("ogg") | Some("opus") => MediaKind::Audio,
            _ => MediaKind::Other,
        }
    }
}

/// One directory entry
#[derive(Debug, Clone, Serialize)]
pub struct MediaEntry {
    pub name: String,
    pub size: u64,
    pub kind: MediaKind,
}

/// Files selected for one playback request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSet {
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
}

impl MediaSet {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// Media directory accessor
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    dir: PathBuf,
    video_file: String,
    audio_file: String,
}

impl MediaLibrary {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            dir: config.dir_path(),
            video_file: config.video_file.clone(),
            audio_file: config.audio_file.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List regular files in the media directory, sorted by name
    pub async fn list(&self) -> Result<Vec<MediaEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let path = entry.path();
            entries.push(MediaEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                kind: MediaKind::from_path(&path),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Listed {} entries in {}", entries.len(), self.dir.display());
        Ok(entries)
    }

    /// Check whether a file of this name exists in the media directory
    pub async fn exists(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(tokio::fs::metadata(self.dir.join(name))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    /// Resolve a playback request to the files to stream
    ///
    /// `name` is a file stem selecting `<stem>.ivf` and `<stem>.ogg`; without
    /// it the configured fixed file names are used. Files that do not exist
    /// are left out; if neither exists the request fails with `MediaNotFound`.
    pub async fn resolve(&self, name: Option<&str>) -> Result<MediaSet> {
        let (video, audio) = match name {
            Some(stem) if !stem.is_empty() => {
                validate_name(stem)?;
                (format!("{}.ivf", stem), format!("{}.ogg", stem))
            }
            _ => (self.video_file.clone(), self.audio_file.clone()),
        };

        let video = self.existing(&video).await;
        let audio = self.existing(&audio).await;
        let set = MediaSet { video, audio };

        if set.is_empty() {
            return Err(AppError::MediaNotFound(
                name.unwrap_or(&self.video_file).to_string(),
            ));
        }
        Ok(set)
    }

    async fn existing(&self, file: &str) -> Option<PathBuf> {
        let path = self.dir.join(file);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Some(path),
            _ => None,
        }
    }
}

/// Accept only a single plain file name inside the media directory
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_file = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if !single_file || name.contains(['/', '\\', '\0']) {
        return Err(AppError::BadRequest(format!("Invalid media name: {}", name)));
    }
    Ok(())
}
