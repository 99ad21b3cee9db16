use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ConfigStore;
use crate::events::EventBus;
use crate::media::MediaLibrary;
use crate::webrtc::SessionManager;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Owner of the single peer session
    pub sessions: Arc<SessionManager>,
    /// Event bus for real-time notifications
    pub events: Arc<EventBus>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ConfigStore, events: Arc<EventBus>, shutdown_tx: broadcast::Sender<()>) -> Arc<Self> {
        let sessions = Arc::new(SessionManager::new(
            config.get().webrtc.clone(),
            events.clone(),
        ));

        Arc::new(Self {
            config,
            sessions,
            events,
            shutdown_tx,
        })
    }

    /// Media library for the currently configured directory
    pub fn library(&self) -> MediaLibrary {
        MediaLibrary::new(&self.config.get().media)
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Forward configuration changes to the session manager
    ///
    /// Peer settings apply to the next session; the running one keeps its
    /// negotiated transport.
    pub fn spawn_config_watcher(self: &Arc<Self>) {
        let state = self.clone();
        let mut changes = self.config.subscribe();
        let mut shutdown = self.shutdown_signal();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = changes.recv() => match change {
                        Ok(change) => {
                            debug!("Config changed: {}", change.key);
                            state
                                .sessions
                                .update_config(state.config.get().webrtc.clone())
                                .await;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn test_library_follows_config() {
        let store = ConfigStore::in_memory(AppConfig::default());
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(store, Arc::new(EventBus::new()), shutdown_tx);

        assert_eq!(state.library().dir(), std::path::Path::new("videos"));

        state
            .config
            .update(|c| c.media.dir = "/srv/media".to_string())
            .await
            .unwrap();
        assert_eq!(state.library().dir(), std::path::Path::new("/srv/media"));
    }

    #[tokio::test]
    async fn test_watcher_forwards_peer_settings() {
        let store = ConfigStore::in_memory(AppConfig::default());
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(store, Arc::new(EventBus::new()), shutdown_tx.clone());
        state.spawn_config_watcher();

        state
            .config
            .update(|c| c.webrtc.gathering_timeout_ms = 750)
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while state.sessions.config().await.gathering_timeout_ms != 750 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("watcher did not forward the update");

        let _ = shutdown_tx.send(());
    }
}
