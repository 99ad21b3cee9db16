//! Outbound tracks: VP8 video and Opus audio
//!
//! Both wrap `TrackLocalStaticSample`, which packetizes whole encoded units
//! (an IVF frame, an Ogg page) into RTP and advances the RTP timestamp by
//! the announced sample duration.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::{AppError, Result};
use crate::media::{FeedbackChannel, MediaSample, PipelineKind, SampleSink};

/// Create RTP codec capability for VP8 video
pub fn video_codec_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "video/VP8".to_string(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}

/// Create RTP codec capability for audio (Opus)
pub fn audio_codec_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "audio/opus".to_string(),
        clock_rate: 48000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        rtcp_feedback: vec![],
    }
}

/// Track write statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TrackStats {
    pub samples_sent: u64,
    pub bytes_sent: u64,
    pub errors: u64,
}

/// One outbound media track
pub struct OutboundTrack {
    kind: PipelineKind,
    track: Arc<TrackLocalStaticSample>,
    samples_sent: AtomicU64,
    bytes_sent: AtomicU64,
    errors: AtomicU64,
}

impl OutboundTrack {
    /// Create the VP8 video track, labelled `video`
    pub fn video(stream_id: &str) -> Self {
        Self::new(PipelineKind::Video, video_codec_capability(), stream_id)
    }

    /// Create the Opus audio track, labelled `audio`
    pub fn audio(stream_id: &str) -> Self {
        Self::new(PipelineKind::Audio, audio_codec_capability(), stream_id)
    }

    fn new(kind: PipelineKind, codec: RTCRtpCodecCapability, stream_id: &str) -> Self {
        let track = Arc::new(TrackLocalStaticSample::new(
            codec,
            kind.to_string(),
            stream_id.to_string(),
        ));

        Self {
            kind,
            track,
            samples_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn mime_type(&self) -> String {
        self.track.codec().mime_type
    }

    /// Get track as TrackLocal for `add_track`
    pub fn as_track_local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }

    pub fn stats(&self) -> TrackStats {
        TrackStats {
            samples_sent: self.samples_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SampleSink for OutboundTrack {
    fn label(&self) -> &str {
        match self.kind {
            PipelineKind::Video => "video",
            PipelineKind::Audio => "audio",
        }
    }

    async fn write_sample(&self, sample: &MediaSample) -> Result<()> {
        let rtc_sample = Sample {
            data: sample.data.clone(),
            duration: sample.duration,
            ..Default::default()
        };

        match self.track.write_sample(&rtc_sample).await {
            Ok(()) => {
                self.samples_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent
                    .fetch_add(sample.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                error!("Failed to write {} sample: {}", self.kind, e);
                Err(AppError::SinkWriteFailure {
                    track: self.label().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// RTCP from the remote peer arrives through the sender of each track
#[async_trait]
impl FeedbackChannel for RTCRtpSender {
    async fn read_feedback(&self, buf: &mut [u8]) -> Result<usize> {
        let (packets, _attributes) = self
            .read(buf)
            .await
            .map_err(|e| AppError::WebRtcError(e.to_string()))?;
        Ok(packets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_track_identity() {
        let video = OutboundTrack::video("rtc-playout");
        assert_eq!(video.label(), "video");
        assert_eq!(video.mime_type(), "video/VP8");
        assert_eq!(video.as_track_local().id(), "video");
        assert_eq!(video.as_track_local().stream_id(), "rtc-playout");

        let audio = OutboundTrack::audio("rtc-playout");
        assert_eq!(audio.label(), "audio");
        assert_eq!(audio.mime_type(), "audio/opus");
        assert_eq!(audio.kind(), PipelineKind::Audio);
    }

    #[tokio::test]
    async fn test_unbound_write_counts_sample() {
        // Without a negotiated binding the track accepts and drops samples
        let track = OutboundTrack::audio("rtc-playout");
        let sample = MediaSample::new(&b"opus"[..], Duration::from_millis(20));
        track.write_sample(&sample).await.unwrap();

        let stats = track.stats();
        assert_eq!(stats.samples_sent, 1);
        assert_eq!(stats.bytes_sent, 4);
        assert_eq!(stats.errors, 0);
    }
}
