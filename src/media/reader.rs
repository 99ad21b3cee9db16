//! Byte-accounting reader for container demuxers
//!
//! The IVF and Ogg readers report a clean end of file and a truncated unit
//! the same way (`UnexpectedEof`). Counting consumed bytes against the known
//! input length lets a source tell the two apart before parsing the next unit.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Reader that records how many bytes the parser has consumed
pub struct CountingReader<R> {
    inner: R,
    consumed: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicU64>) {
        let consumed = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                consumed: consumed.clone(),
            },
            consumed,
        )
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Position tracker shared with a `CountingReader`
#[derive(Debug, Clone)]
pub struct StreamCursor {
    consumed: Arc<AtomicU64>,
    total: u64,
}

impl StreamCursor {
    pub fn new(consumed: Arc<AtomicU64>, total: u64) -> Self {
        Self { consumed, total }
    }

    pub fn position(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// All input consumed on a unit boundary
    pub fn at_end(&self) -> bool {
        self.position() >= self.total
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Wrap `inner` so consumption can be compared against `total` bytes
pub fn counted<R: Read>(inner: R, total: u64) -> (CountingReader<R>, StreamCursor) {
    let (reader, consumed) = CountingReader::new(inner);
    (reader, StreamCursor::new(consumed, total))
}

/// Open a container file with buffering, returning the reader and its length
pub fn open_container(path: &Path) -> io::Result<(BufReader<File>, u64)> {
    let file = File::open(path)?;
    let total = file.metadata()?.len();
    Ok((BufReader::new(file), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_counts_consumed_bytes() {
        let data = vec![7u8; 10];
        let (mut reader, consumed) = CountingReader::new(Cursor::new(data));
        let cursor = StreamCursor::new(consumed, 10);

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(cursor.position(), 4);
        assert!(!cursor.at_end());

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(cursor.position(), 10);
        assert!(cursor.at_end());
    }

    #[test]
    fn test_open_container_reports_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let (reader, total) = open_container(&path).unwrap();
        assert_eq!(total, 3);

        let (_, cursor) = counted(reader, total);
        assert_eq!(cursor.total(), 3);
        assert_eq!(cursor.position(), 0);
    }
}
