//! Encoded media unit handed from a source to a track

use bytes::Bytes;
use std::time::Duration;

/// One encoded unit (IVF frame or Ogg page) plus its announced duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

impl MediaSample {
    pub fn new(data: impl Into<Bytes>, duration: Duration) -> Self {
        Self {
            data: data.into(),
            duration,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Pull-style producer of samples in file order
///
/// `Ok(None)` is end-of-stream; any `Err` is fatal to the pipeline reading it.
pub trait SampleSource: Send {
    fn next_sample(&mut self) -> crate::error::Result<Option<MediaSample>>;
}
