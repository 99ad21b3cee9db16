//! Track Sink: destination of timestamped samples

use async_trait::async_trait;

use super::sample::MediaSample;
use crate::error::Result;

/// Accepts one sample at a time for transmission
///
/// A write error is fatal to the pipeline that issued it and should be
/// reported as `AppError::SinkWriteFailure`.
#[async_trait]
pub trait SampleSink: Send + Sync {
    /// Human-readable track label used in logs
    fn label(&self) -> &str;

    async fn write_sample(&self, sample: &MediaSample) -> Result<()>;
}
