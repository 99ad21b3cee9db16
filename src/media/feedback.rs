//! Feedback Drain
//!
//! Interceptors (NACK, reports) only process inbound RTCP for a sender while
//! somebody reads it. The drain reads and discards until the channel closes,
//! then returns without retrying.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::Result;

/// MTU-sized read buffer for feedback packets
pub const FEEDBACK_BUFFER_SIZE: usize = 1500;

/// Inbound control channel belonging to one outbound track
#[async_trait]
pub trait FeedbackChannel: Send + Sync {
    /// Block until feedback arrives; returns the number of packets read.
    /// An error means the channel is closed for good.
    async fn read_feedback(&self, buf: &mut [u8]) -> Result<usize>;
}

/// Read and discard feedback until the channel fails, returning the number of
/// successful reads.
pub async fn drain<C>(channel: &C, label: &str) -> u64
where
    C: FeedbackChannel + ?Sized,
{
    let mut buf = vec![0u8; FEEDBACK_BUFFER_SIZE];
    let mut reads = 0u64;

    loop {
        match channel.read_feedback(&mut buf).await {
            Ok(packets) => {
                reads += 1;
                trace!("{} feedback: {} packets", label, packets);
            }
            Err(e) => {
                debug!("{} feedback channel closed after {} reads: {}", label, reads, e);
                return reads;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, Mutex};

    /// Feedback channel fed from an mpsc; closed when the sender drops
    struct FakeFeedback {
        rx: Mutex<mpsc::Receiver<usize>>,
        reads_after_close: AtomicU64,
    }

    impl FakeFeedback {
        fn new() -> (mpsc::Sender<usize>, Self) {
            let (tx, rx) = mpsc::channel(8);
            (
                tx,
                Self {
                    rx: Mutex::new(rx),
                    reads_after_close: AtomicU64::new(0),
                },
            )
        }
    }

    #[async_trait]
    impl FeedbackChannel for FakeFeedback {
        async fn read_feedback(&self, _buf: &mut [u8]) -> Result<usize> {
            match self.rx.lock().await.recv().await {
                Some(n) => Ok(n),
                None => {
                    self.reads_after_close.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::WebRtcError("closed".into()))
                }
            }
        }
    }

    #[tokio::test]
    async fn test_drain_counts_reads_until_close() {
        let (tx, channel) = FakeFeedback::new();
        for n in [1, 2, 1] {
            tx.send(n).await.unwrap();
        }
        drop(tx);

        let reads = drain(&channel, "video").await;
        assert_eq!(reads, 3);
        assert_eq!(channel.reads_after_close.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_exits_promptly_when_closed_mid_stream() {
        let (tx, channel) = FakeFeedback::new();
        let channel = std::sync::Arc::new(channel);

        let handle = tokio::spawn({
            let channel = channel.clone();
            async move { drain(channel.as_ref(), "audio").await }
        });

        tx.send(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(tx);

        let reads = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("drain did not return after close")
            .unwrap();
        assert_eq!(reads, 1);
        // One failing read, no busy loop afterwards
        assert_eq!(channel.reads_after_close.load(Ordering::SeqCst), 1);
    }
}
