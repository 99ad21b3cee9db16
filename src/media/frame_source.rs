//! Frame Source: IVF video demuxer
//!
//! Reads the file header once (timebase, dimensions, codec fourcc) and then
//! yields one encoded frame per call in file order. End-of-stream is
//! `Ok(None)`; a truncated or corrupt frame is `UnreadableContainer`.

use bytes::Bytes;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};
use webrtc::media::io::ivf_reader::IVFReader;

use super::reader::{counted, open_container, CountingReader, StreamCursor};
use super::sample::{MediaSample, SampleSource};
use crate::error::{AppError, Result};

/// Rational timebase from the IVF header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timebase {
    pub numerator: u32,
    pub denominator: u32,
}

impl Timebase {
    /// Clock period for one frame: `1000 * numerator / denominator` ms,
    /// kept at nanosecond precision (1/30 -> 33.333333 ms).
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000u64 * self.numerator as u64 / self.denominator as u64)
    }
}

/// Stream parameters read from the IVF file header
#[derive(Debug, Clone, Serialize)]
pub struct VideoHeader {
    pub four_cc: String,
    pub width: u16,
    pub height: u16,
    pub timebase: Timebase,
    /// Frame count declared by the muxer (informational, often 0)
    pub declared_frames: u32,
}

/// IVF frame demuxer
pub struct FrameSource<R: Read> {
    reader: IVFReader<CountingReader<R>>,
    cursor: StreamCursor,
    header: VideoHeader,
    announced: Duration,
    frames_read: u64,
    label: String,
}

impl FrameSource<BufReader<File>> {
    /// Open an IVF file and parse its header
    pub fn open(path: &Path) -> Result<Self> {
        let (reader, total) = open_container(path).map_err(|e| AppError::unreadable(path, e))?;
        Self::from_reader(reader, total, path.display().to_string())
    }
}

impl<R: Read> FrameSource<R> {
    /// Build a source over any reader whose total length is known
    pub fn from_reader(inner: R, total_len: u64, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let (reader, cursor) = counted(inner, total_len);

        let (reader, file_header) =
            IVFReader::new(reader).map_err(|e| AppError::unreadable(&label, e))?;

        let timebase = Timebase {
            numerator: file_header.timebase_numerator,
            denominator: file_header.timebase_denominator,
        };
        if timebase.numerator == 0 || timebase.denominator == 0 {
            return Err(AppError::unreadable(
                &label,
                format!(
                    "invalid timebase {}/{}",
                    timebase.numerator, timebase.denominator
                ),
            ));
        }

        let header = VideoHeader {
            four_cc: String::from_utf8_lossy(&file_header.four_cc).into_owned(),
            width: file_header.width,
            height: file_header.height,
            timebase,
            declared_frames: file_header.num_frames,
        };

        debug!(
            "Opened IVF {}: {} {}x{} timebase {}/{}",
            label,
            header.four_cc,
            header.width,
            header.height,
            timebase.numerator,
            timebase.denominator
        );

        Ok(Self {
            reader,
            cursor,
            announced: timebase.tick_period(),
            header,
            frames_read: 0,
            label,
        })
    }

    /// Override the duration announced with every frame
    pub fn with_announced_duration(mut self, duration: Duration) -> Self {
        self.announced = duration;
        self
    }

    pub fn header(&self) -> &VideoHeader {
        &self.header
    }

    pub fn timebase(&self) -> Timebase {
        self.header.timebase
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next frame payload, `None` at end-of-stream
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.cursor.at_end() {
            return Ok(None);
        }

        let (frame, frame_header) = self.reader.parse_next_frame().map_err(|e| {
            AppError::unreadable(
                &self.label,
                format!(
                    "frame {} at byte {}: {}",
                    self.frames_read,
                    self.cursor.position(),
                    e
                ),
            )
        })?;

        self.frames_read += 1;
        trace!(
            "IVF frame {}: {} bytes, pts {}",
            self.frames_read,
            frame_header.frame_size,
            frame_header.timestamp
        );

        Ok(Some(frame.into()))
    }
}

impl<R: Read + Send> SampleSource for FrameSource<R> {
    fn next_sample(&mut self) -> Result<Option<MediaSample>> {
        Ok(self
            .next_frame()?
            .map(|data| MediaSample::new(data, self.announced)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build an IVF file: 32-byte header followed by 12-byte frame headers
    pub(crate) fn ivf_bytes(numerator: u32, denominator: u32, frames: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"DKIF");
        out.extend_from_slice(&0u16.to_le_bytes()); // version
        out.extend_from_slice(&32u16.to_le_bytes()); // header size
        out.extend_from_slice(b"VP80");
        out.extend_from_slice(&640u16.to_le_bytes());
        out.extend_from_slice(&480u16.to_le_bytes());
        out.extend_from_slice(&denominator.to_le_bytes());
        out.extend_from_slice(&numerator.to_le_bytes());
        out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        for (i, frame) in frames.iter().enumerate() {
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(i as u64).to_le_bytes());
            out.extend_from_slice(frame);
        }
        out
    }

    fn source(bytes: Vec<u8>) -> Result<FrameSource<Cursor<Vec<u8>>>> {
        let len = bytes.len() as u64;
        FrameSource::from_reader(Cursor::new(bytes), len, "test.ivf")
    }

    #[test]
    fn test_header_parsed_once() {
        let src = source(ivf_bytes(1, 30, &[b"a"])).unwrap();
        let header = src.header();
        assert_eq!(header.four_cc, "VP80");
        assert_eq!(header.width, 640);
        assert_eq!(header.height, 480);
        assert_eq!(
            src.timebase(),
            Timebase {
                numerator: 1,
                denominator: 30
            }
        );
    }

    #[test]
    fn test_n_frames_then_end_of_stream() {
        let frames: [&[u8]; 3] = [b"first", b"second-frame", b"3"];
        let mut src = source(ivf_bytes(1, 30, &frames)).unwrap();

        for expected in frames {
            let frame = src.next_frame().unwrap().unwrap();
            assert_eq!(&frame[..], expected);
        }
        assert!(src.next_frame().unwrap().is_none());
        assert_eq!(src.frames_read(), 3);
    }

    #[test]
    fn test_empty_stream() {
        let mut src = source(ivf_bytes(1, 25, &[])).unwrap();
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let mut bytes = ivf_bytes(1, 30, &[b"complete", b"will be cut"]);
        bytes.truncate(bytes.len() - 4);
        let mut src = source(bytes).unwrap();

        assert!(src.next_frame().unwrap().is_some());
        let err = src.next_frame().unwrap_err();
        assert!(matches!(err, AppError::UnreadableContainer { .. }));
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = ivf_bytes(1, 30, &[b"a"]);
        bytes[..4].copy_from_slice(b"RIFF");
        assert!(matches!(
            source(bytes),
            Err(AppError::UnreadableContainer { .. })
        ));
    }

    #[test]
    fn test_zero_timebase_rejected() {
        assert!(matches!(
            source(ivf_bytes(0, 30, &[b"a"])),
            Err(AppError::UnreadableContainer { .. })
        ));
        assert!(matches!(
            source(ivf_bytes(1, 0, &[b"a"])),
            Err(AppError::UnreadableContainer { .. })
        ));
    }

    #[test]
    fn test_tick_period() {
        let tb = Timebase {
            numerator: 1,
            denominator: 30,
        };
        assert_eq!(tb.tick_period(), Duration::from_nanos(33_333_333));

        let tb = Timebase {
            numerator: 1001,
            denominator: 30000,
        };
        assert_eq!(tb.tick_period(), Duration::from_nanos(33_366_666));
    }

    #[test]
    fn test_samples_carry_announced_duration() {
        let mut src = source(ivf_bytes(1, 30, &[b"x"]))
            .unwrap()
            .with_announced_duration(Duration::from_secs(1));
        let sample = src.next_sample().unwrap().unwrap();
        assert_eq!(sample.duration, Duration::from_secs(1));
        assert_eq!(&sample.data[..], b"x");
        assert!(src.next_sample().unwrap().is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let err = FrameSource::open(Path::new("/nonexistent/output.ivf"))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::UnreadableContainer { .. }));
    }
}
