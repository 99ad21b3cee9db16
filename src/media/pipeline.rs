//! Pipeline: one Source + Pacing Clock + Track Sink
//!
//! State machine: `Idle -> Streaming -> {Completed, Failed, Stopped}`.
//!
//! Each clock tick pulls exactly one unit from the source and writes it to
//! the sink. End-of-stream completes the pipeline; a source or sink error
//! fails only this pipeline and is published as a session event.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::clock::PacingClock;
use super::sample::SampleSource;
use super::sink::SampleSink;
use crate::error::{AppError, Result};
use crate::events::{EventBus, SystemEvent};

/// Which track a pipeline feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Video,
    Audio,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Video => write!(f, "video"),
            PipelineKind::Audio => write!(f, "audio"),
        }
    }
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Created, source not opened yet
    #[default]
    Idle,
    /// Delivering units on every tick
    Streaming,
    /// Source reached end-of-stream
    Completed,
    /// Source or sink error
    Failed,
    /// Cancelled before completion
    Stopped,
}

impl PipelineState {
    /// Completed, Failed and Stopped are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Streaming => "streaming",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
            PipelineState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    pub kind: PipelineKind,
    pub state: PipelineState,
    pub units_sent: u64,
    pub error: Option<AppError>,
}

/// Snapshot exposed through the session status API
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub kind: PipelineKind,
    pub state: PipelineState,
    pub units_sent: u64,
}

/// A single video or audio pipeline
pub struct Pipeline {
    kind: PipelineKind,
    session_id: String,
    state: watch::Sender<PipelineState>,
    units_sent: AtomicU64,
    events: Option<Arc<EventBus>>,
}

impl Pipeline {
    pub fn new(kind: PipelineKind, session_id: impl Into<String>) -> Self {
        let (state, _rx) = watch::channel(PipelineState::Idle);
        Self {
            kind,
            session_id: session_id.into(),
            state,
            units_sent: AtomicU64::new(0),
            events: None,
        }
    }

    /// Publish state transitions to the event bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn state_watch(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn units_sent(&self) -> u64 {
        self.units_sent.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            kind: self.kind,
            state: self.state(),
            units_sent: self.units_sent(),
        }
    }

    fn transition(&self, state: PipelineState, error: Option<String>) {
        self.state.send_replace(state);

        if let Some(ref events) = self.events {
            events.publish(SystemEvent::PipelineStateChanged {
                session_id: self.session_id.clone(),
                kind: self.kind,
                state,
                units_sent: self.units_sent(),
                error,
            });
        }
    }

    fn finish(&self, state: PipelineState, error: Option<AppError>) -> PipelineReport {
        let units_sent = self.units_sent();
        match (&state, &error) {
            (PipelineState::Failed, Some(e)) => warn!(
                "{} pipeline of session {} failed after {} units: {}",
                self.kind, self.session_id, units_sent, e
            ),
            _ => info!(
                "{} pipeline of session {} {} after {} units",
                self.kind, self.session_id, state, units_sent
            ),
        }

        self.transition(state, error.as_ref().map(|e| e.to_string()));
        PipelineReport {
            kind: self.kind,
            state,
            units_sent,
            error,
        }
    }

    /// Mark a pipeline that never got to open its source as stopped
    pub fn stop_before_start(&self) -> PipelineReport {
        self.finish(PipelineState::Stopped, None)
    }

    /// `run`, but a panic inside the source, clock or sink ends the pipeline
    /// as `Failed` instead of leaving it `Streaming`
    pub async fn run_guarded<S, C, O>(
        &self,
        open: O,
        sink: &dyn SampleSink,
        cancel: &CancellationToken,
    ) -> PipelineReport
    where
        S: SampleSource,
        C: PacingClock,
        O: FnOnce() -> Result<(S, C)>,
    {
        match AssertUnwindSafe(self.run(open, sink, cancel))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(_) => self.finish(
                PipelineState::Failed,
                Some(AppError::Internal(format!("{} pipeline panicked", self.kind))),
            ),
        }
    }

    /// Run the pipeline to completion
    ///
    /// `open` creates the source and its clock; an error there fails the
    /// pipeline without any write. The loop waits for a tick, reads one unit
    /// and writes it, strictly in file order.
    pub async fn run<S, C, O>(
        &self,
        open: O,
        sink: &dyn SampleSink,
        cancel: &CancellationToken,
    ) -> PipelineReport
    where
        S: SampleSource,
        C: PacingClock,
        O: FnOnce() -> Result<(S, C)>,
    {
        if cancel.is_cancelled() {
            return self.finish(PipelineState::Stopped, None);
        }

        let (mut source, mut clock) = match open() {
            Ok(opened) => opened,
            Err(e) => return self.finish(PipelineState::Failed, Some(e)),
        };

        debug!(
            "{} pipeline of session {} streaming to {} every {:?}",
            self.kind,
            self.session_id,
            sink.label(),
            clock.period()
        );
        self.transition(PipelineState::Streaming, None);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.finish(PipelineState::Stopped, None);
                }
                _ = clock.tick() => {}
            }

            let sample = match source.next_sample() {
                Ok(Some(sample)) => sample,
                Ok(None) => return self.finish(PipelineState::Completed, None),
                Err(e) => return self.finish(PipelineState::Failed, Some(e)),
            };

            if let Err(e) = sink.write_sample(&sample).await {
                let e = match e {
                    e @ AppError::SinkWriteFailure { .. } => e,
                    other => AppError::SinkWriteFailure {
                        track: sink.label().to_string(),
                        reason: other.to_string(),
                    },
                };
                return self.finish(PipelineState::Failed, Some(e));
            }

            let sent = self.units_sent.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(
                "{} unit {} -> {} ({} bytes, {:?})",
                self.kind,
                sent,
                sink.label(),
                sample.len(),
                sample.duration
            );
        }
    }
}
