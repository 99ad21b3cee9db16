//! Event system for real-time state notifications
//!
//! Session and pipeline transitions are broadcast here so that failures
//! which never reach an HTTP response are still observable by clients.

pub mod types;

pub use types::SystemEvent;

use tokio::sync::broadcast;
use tracing::trace;

/// Default ring buffer size
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out of `SystemEvent`s to every live subscriber
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    /// Bus whose slowest subscriber may trail by at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers, returning how many received it
    pub fn publish(&self, event: SystemEvent) -> usize {
        let name = event.event_name();
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!("Event {} delivered to {} subscriber(s)", name, delivered);
        delivered
    }

    /// Receiver for events published from now on
    ///
    /// Falling behind yields `RecvError::Lagged` and the skipped events are lost.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
