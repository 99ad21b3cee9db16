//! Session ownership
//!
//! Exactly one `PeerSession` exists at a time. The manager hands it out,
//! replaces it once its connection is dead, and tears it down on reset.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::config::WebRtcConfig;
use super::peer::PeerSession;
use crate::error::Result;
use crate::events::EventBus;

/// Owner of the current peer session
pub struct SessionManager {
    config: RwLock<WebRtcConfig>,
    current: RwLock<Option<Arc<PeerSession>>>,
    events: Arc<EventBus>,
}

impl SessionManager {
    pub fn new(config: WebRtcConfig, events: Arc<EventBus>) -> Self {
        Self {
            config: RwLock::new(config),
            current: RwLock::new(None),
            events,
        }
    }

    /// Apply new peer settings; takes effect for the next session
    pub async fn update_config(&self, config: WebRtcConfig) {
        *self.config.write().await = config;
    }

    /// Peer settings the next session will be built with
    pub async fn config(&self) -> WebRtcConfig {
        self.config.read().await.clone()
    }

    /// Get the live session, creating one if none exists or the previous one
    /// reached a terminal state
    pub async fn current(&self) -> Result<Arc<PeerSession>> {
        if let Some(session) = self.current.read().await.as_ref() {
            if !session.is_terminal() {
                return Ok(session.clone());
            }
        }

        let mut current = self.current.write().await;
        // Another caller may have replaced it while we waited for the lock
        if let Some(session) = current.as_ref() {
            if !session.is_terminal() {
                return Ok(session.clone());
            }
            info!("Replacing terminal session {}", session.session_id());
            if let Err(e) = session.close("connection ended").await {
                warn!("Failed to close session {}: {}", session.session_id(), e);
            }
        }

        let config = self.config.read().await.clone();
        let session = Arc::new(PeerSession::new(&config, self.events.clone()).await?);
        info!("Session created: {}", session.session_id());
        *current = Some(session.clone());
        Ok(session)
    }

    /// Peek at the session without creating one
    pub async fn peek(&self) -> Option<Arc<PeerSession>> {
        self.current.read().await.clone()
    }

    /// Close the current session and start a fresh one
    pub async fn reset(&self) -> Result<Arc<PeerSession>> {
        let mut current = self.current.write().await;
        if let Some(old) = current.take() {
            old.close("reset").await?;
        }

        let config = self.config.read().await.clone();
        let session = Arc::new(PeerSession::new(&config, self.events.clone()).await?);
        info!("Session reset, new session {}", session.session_id());
        *current = Some(session.clone());
        Ok(session)
    }

    /// Close the current session without replacing it
    pub async fn close(&self) -> Result<()> {
        if let Some(session) = self.current.write().await.take() {
            session.close("shutdown").await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SystemEvent;

    fn manager() -> SessionManager {
        SessionManager::new(WebRtcConfig::default(), Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn test_current_is_stable() {
        let manager = manager();
        assert!(manager.peek().await.is_none());

        let first = manager.current().await.unwrap();
        let second = manager.current().await.unwrap();
        assert_eq!(first.session_id(), second.session_id());
    }

    #[tokio::test]
    async fn test_terminal_session_replaced() {
        let manager = manager();
        let first = manager.current().await.unwrap();
        first.close("test").await.unwrap();

        let second = manager.current().await.unwrap();
        assert_ne!(first.session_id(), second.session_id());
        assert!(!second.is_terminal());
    }

    #[tokio::test]
    async fn test_reset_closes_previous() {
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let manager = SessionManager::new(WebRtcConfig::default(), events);

        let first = manager.current().await.unwrap();
        let fresh = manager.reset().await.unwrap();
        assert!(first.is_terminal());
        assert_ne!(first.session_id(), fresh.session_id());

        let mut saw_reset = false;
        while let Ok(event) = rx.try_recv() {
            if let SystemEvent::SessionClosed { session_id, reason } = event {
                assert_eq!(session_id, first.session_id());
                assert_eq!(reason, "reset");
                saw_reset = true;
            }
        }
        assert!(saw_reset);
    }

    #[tokio::test]
    async fn test_close() {
        let manager = manager();
        let session = manager.current().await.unwrap();
        manager.close().await.unwrap();
        assert!(session.is_terminal());
        assert!(manager.peek().await.is_none());
    }
}
