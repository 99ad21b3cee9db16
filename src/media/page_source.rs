//! Page Source: Ogg audio demuxer
//!
//! Yields one Ogg page at a time. The playback duration of a page is the
//! difference between its granule position and the previous one, divided by
//! the (fixed) sample rate of the granule clock.

use bytes::Bytes;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};
use webrtc::media::io::ogg_reader::OggReader;

use super::reader::{counted, open_container, CountingReader, StreamCursor};
use super::sample::{MediaSample, SampleSource};
use crate::error::{AppError, Result};

/// Granule position meaning "no packet completes on this page"
pub const GRANULE_UNSET: u64 = u64::MAX;

/// One demuxed page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPage {
    pub data: Bytes,
    pub granule_position: u64,
    pub duration: Duration,
}

/// Tracks granule positions and converts their differences to durations
#[derive(Debug, Clone)]
pub struct GranuleClock {
    sample_rate: u32,
    last: u64,
}

impl GranuleClock {
    /// A zero rate is clamped to 1 Hz
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            last: 0,
        }
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    /// Advance to `granule` and return the duration covered since the
    /// previous position. Positions must never decrease.
    pub fn advance(&mut self, granule: u64) -> Result<Duration> {
        if granule == GRANULE_UNSET {
            return Ok(Duration::ZERO);
        }
        if granule < self.last {
            return Err(AppError::InvalidSampleSequence {
                previous: self.last,
                current: granule,
            });
        }

        let samples = granule - self.last;
        self.last = granule;

        // Whole seconds first so a huge jump cannot overflow the nanosecond product
        let rate = self.sample_rate as u64;
        let nanos = (samples % rate) * 1_000_000_000 / rate;
        Ok(Duration::new(samples / rate, nanos as u32))
    }
}

/// Ogg page demuxer
pub struct PageSource<R: Read> {
    reader: OggReader<CountingReader<R>>,
    cursor: StreamCursor,
    clock: GranuleClock,
    pages_read: u64,
    label: String,
}

impl PageSource<BufReader<File>> {
    /// Open an Ogg file and validate its identification header
    pub fn open(path: &Path, sample_rate: u32, verify_checksum: bool) -> Result<Self> {
        let (reader, total) = open_container(path).map_err(|e| AppError::unreadable(path, e))?;
        Self::from_reader(
            reader,
            total,
            sample_rate,
            verify_checksum,
            path.display().to_string(),
        )
    }
}

impl<R: Read> PageSource<R> {
    /// Build a source over any reader whose total length is known
    pub fn from_reader(
        inner: R,
        total_len: u64,
        sample_rate: u32,
        verify_checksum: bool,
        label: impl Into<String>,
    ) -> Result<Self> {
        let label = label.into();
        if sample_rate == 0 {
            return Err(AppError::Config("audio sample rate must be non-zero".into()));
        }

        let (reader, cursor) = counted(inner, total_len);
        let (reader, _id_header) =
            OggReader::new(reader, verify_checksum).map_err(|e| AppError::unreadable(&label, e))?;

        debug!("Opened Ogg {} (granule clock {} Hz)", label, sample_rate);

        Ok(Self {
            reader,
            cursor,
            clock: GranuleClock::new(sample_rate),
            pages_read: 0,
            label,
        })
    }

    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// Read the next page, `None` at end-of-stream
    pub fn next_page(&mut self) -> Result<Option<AudioPage>> {
        if self.cursor.at_end() {
            return Ok(None);
        }

        let (payload, page_header) = self.reader.parse_next_page().map_err(|e| {
            AppError::unreadable(
                &self.label,
                format!(
                    "page {} at byte {}: {}",
                    self.pages_read,
                    self.cursor.position(),
                    e
                ),
            )
        })?;

        let granule_position = page_header.granule_position;
        let duration = self.clock.advance(granule_position)?;
        self.pages_read += 1;

        trace!(
            "Ogg page {}: {} bytes, granule {}, {:?}",
            self.pages_read,
            payload.len(),
            granule_position,
            duration
        );

        Ok(Some(AudioPage {
            data: payload.into(),
            granule_position,
            duration,
        }))
    }
}

impl<R: Read + Send> SampleSource for PageSource<R> {
    fn next_sample(&mut self) -> Result<Option<MediaSample>> {
        Ok(self
            .next_page()?
            .map(|page| MediaSample::new(page.data, page.duration)))
    }
}
