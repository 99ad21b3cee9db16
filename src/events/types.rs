//! System event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::media::pipeline::{PipelineKind, PipelineState};
use crate::webrtc::signaling::ConnectionState;

/// System event enumeration
///
/// Serialized as `{ "event": "<name>", "data": { ... } }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SystemEvent {
    // ============================================================================
    // Session Events
    // ============================================================================
    /// A new peer session was created with its tracks attached
    #[serde(rename = "session.created")]
    SessionCreated {
        session_id: String,
    },

    /// Peer connection state changed
    #[serde(rename = "session.state_changed")]
    SessionStateChanged {
        session_id: String,
        state: ConnectionState,
    },

    /// Offer/answer exchange finished and the local description is final
    #[serde(rename = "session.negotiated")]
    SessionNegotiated {
        session_id: String,
        /// Number of `a=candidate` lines in the answer
        candidates: usize,
    },

    /// Session was torn down (reset or terminal connection state)
    #[serde(rename = "session.closed")]
    SessionClosed {
        session_id: String,
        reason: String,
    },

    // ============================================================================
    // Pipeline Events
    // ============================================================================
    /// A video or audio pipeline changed state
    #[serde(rename = "pipeline.state_changed")]
    PipelineStateChanged {
        session_id: String,
        kind: PipelineKind,
        state: PipelineState,
        /// Units written to the track so far
        units_sent: u64,
        /// Failure reason when `state` is `failed`
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Feedback drain of a track exited because its channel closed
    #[serde(rename = "feedback.drain_finished")]
    FeedbackDrainFinished {
        session_id: String,
        track: String,
        reads: u64,
    },

    /// Generic error (e.g. event stream lag)
    #[serde(rename = "error")]
    Error { message: String },
}

impl SystemEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session.created",
            Self::SessionStateChanged { .. } => "session.state_changed",
            Self::SessionNegotiated { .. } => "session.negotiated",
            Self::SessionClosed { .. } => "session.closed",
            Self::PipelineStateChanged { .. } => "pipeline.state_changed",
            Self::FeedbackDrainFinished { .. } => "feedback.drain_finished",
            Self::Error { .. } => "error",
        }
    }

    /// Check if event name matches a topic pattern
    ///
    /// Supports wildcards:
    /// - `*` matches all events
    /// - `pipeline.*` matches all pipeline events
    /// - `pipeline.state_changed` matches exact event
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        if topic.ends_with(".*") {
            let prefix = topic.trim_end_matches('*');
            event_name.starts_with(prefix)
        } else {
            event_name == topic
        }
    }
}
