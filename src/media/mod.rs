//! Media pacing core
//!
//! Container demuxers (IVF video frames, Ogg audio pages), the pacing clock
//! and the pipeline that moves one unit per tick from a source into a track.
//!
//! ```text
//! FrameSource ─┐                    ┌─> video track ── feedback drain
//!              ├─ Pipeline (tick) ──┤
//! PageSource ──┘                    └─> audio track ── feedback drain
//! ```

pub mod clock;
pub mod feedback;
pub mod frame_source;
pub mod library;
pub mod page_source;
pub mod pipeline;
pub mod reader;
pub mod sample;
pub mod sink;

pub use clock::{IntervalClock, PacingClock};
pub use feedback::{drain, FeedbackChannel};
pub use frame_source::{FrameSource, Timebase, VideoHeader};
pub use library::{MediaEntry, MediaKind, MediaLibrary, MediaSet};
pub use page_source::{AudioPage, GranuleClock, PageSource};
pub use pipeline::{Pipeline, PipelineKind, PipelineReport, PipelineState, PipelineStatus};
pub use sample::{MediaSample, SampleSource};
pub use sink::SampleSink;
