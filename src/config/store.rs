use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by an optional JSON file
///
/// Uses `ArcSwap` for lock-free reads. Without a backing file the store is
/// purely in-memory for the process lifetime.
#[derive(Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    /// Lock-free cache using ArcSwap for zero-cost reads
    cache: Arc<ArcSwap<AppConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub key: String,
}

impl ConfigStore {
    /// Create a store from a config file, or defaults when no path is given.
    ///
    /// A missing file is not an error: defaults are used and written on the
    /// first `set`/`update`.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::read_file(path).await?,
            None => AppConfig::default(),
        };

        Ok(Self::with_config(path.map(Path::to_path_buf), config))
    }

    /// Create an in-memory store holding the given configuration
    pub fn in_memory(config: AppConfig) -> Self {
        Self::with_config(None, config)
    }

    fn with_config(path: Option<PathBuf>, config: AppConfig) -> Self {
        let (change_tx, _) = broadcast::channel(16);
        Self {
            path,
            cache: Arc::new(ArcSwap::from_pointee(config)),
            change_tx,
        }
    }

    async fn read_file(path: &Path) -> Result<AppConfig> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                Ok(AppConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, config: &AppConfig) -> Result<()> {
        if let Some(ref path) = self.path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            let json = serde_json::to_vec_pretty(config)?;
            tokio::fs::write(path, json).await?;
        }
        Ok(())
    }

    /// Get current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Set entire configuration
    pub async fn set(&self, config: AppConfig) -> Result<()> {
        self.persist(&config).await?;
        self.cache.store(Arc::new(config));

        let _ = self.change_tx.send(ConfigChange {
            key: "app_config".to_string(),
        });

        Ok(())
    }

    /// Update configuration with a closure
    ///
    /// Read-modify-write: for concurrent updates the last write wins.
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let current = self.cache.load();
        let mut config = (**current).clone();
        f(&mut config);
        self.set(config).await
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rtc-playout.json");

        let store = ConfigStore::load(Some(&path)).await.unwrap();
        assert_eq!(store.get().web.http_port, 8082);

        store
            .update(|c| {
                c.web.http_port = 9000;
                c.media.dir = "/srv/media".to_string();
            })
            .await
            .unwrap();

        let config = store.get();
        assert_eq!(config.web.http_port, 9000);

        // New instance reads what was persisted
        let store2 = ConfigStore::load(Some(&path)).await.unwrap();
        let config = store2.get();
        assert_eq!(config.web.http_port, 9000);
        assert_eq!(config.media.dir, "/srv/media");
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = ConfigStore::load(Some(&path)).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_change_notification() {
        let store = ConfigStore::in_memory(AppConfig::default());
        let mut rx = store.subscribe();

        store.update(|c| c.pacing.audio_page_ms = 40).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.key, "app_config");
        assert_eq!(store.get().pacing.audio_page_ms, 40);
        assert!(store.path().is_none());
    }
}
