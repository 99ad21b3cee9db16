//! Peer session: the single peer connection, its signaling exchange and
//! the playback pipelines feeding its tracks

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

use super::config::WebRtcConfig;
use super::mdns::MdnsPolicy;
use super::signaling::{parse_offer, ConnectionState, NegotiationState, SessionDescription};
use super::track::{OutboundTrack, TrackStats};
use crate::config::{AppConfig, PacingConfig};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SystemEvent};
use crate::media::{
    drain, FrameSource, IntervalClock, MediaSet, PacingClock, PageSource, Pipeline, PipelineKind,
    PipelineStatus, SampleSource,
};

/// Build the WebRTC API object: default codecs, default interceptors
/// (NACK, RTCP reports) and the configured mDNS mode.
pub(crate) fn build_api(session_id: &str) -> Result<API> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| AppError::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

    let mut setting_engine = SettingEngine::default();
    let mdns = MdnsPolicy::from_env();
    mdns.apply(&mut setting_engine, session_id);
    debug!("WebRTC mDNS mode: {} (session {})", mdns.label(), session_id);

    Ok(APIBuilder::new()
        .with_setting_engine(setting_engine)
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Playback parameters taken from the application config at trigger time
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub wait_for_connected: bool,
    pub verify_ogg_checksum: bool,
    pub pacing: PacingConfig,
}

impl PlaybackSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            wait_for_connected: config.media.wait_for_connected,
            verify_ogg_checksum: config.media.verify_ogg_checksum,
            pacing: config.pacing.clone(),
        }
    }
}

/// Playback slot of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackSlot {
    #[default]
    Idle,
    /// A trigger is negotiating; pipelines not started yet
    Reserved,
    /// Pipelines were started
    Running,
}

/// Per-track counters
#[derive(Debug, Clone, Serialize)]
pub struct TrackStatus {
    pub video: TrackStats,
    pub audio: TrackStats,
}

/// Snapshot for the session API
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub connection_state: ConnectionState,
    pub negotiation_state: NegotiationState,
    pub playback: PlaybackSlot,
    pub pipelines: Vec<PipelineStatus>,
    pub tracks: TrackStatus,
}

/// The single peer session
pub struct PeerSession {
    session_id: String,
    created_at: DateTime<Utc>,
    pc: Arc<RTCPeerConnection>,
    video_track: Arc<OutboundTrack>,
    audio_track: Arc<OutboundTrack>,
    state: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    negotiation: Mutex<NegotiationState>,
    playback: Mutex<PlaybackSlot>,
    pipelines: Mutex<Vec<Arc<Pipeline>>>,
    /// Parent of every pipeline's stop signal
    cancel: CancellationToken,
    closed: AtomicBool,
    gathering_timeout: Duration,
    events: Arc<EventBus>,
}

impl PeerSession {
    /// Create the peer connection with both outbound tracks attached
    ///
    /// Each track gets its feedback drain immediately, so RTCP is consumed
    /// from the first packet on.
    pub async fn new(config: &WebRtcConfig, events: Arc<EventBus>) -> Result<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let api = build_api(&session_id)?;

        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers(),
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;
        let pc = Arc::new(pc);

        let video_track = Arc::new(OutboundTrack::video(&config.stream_id));
        let audio_track = Arc::new(OutboundTrack::audio(&config.stream_id));

        for track in [&video_track, &audio_track] {
            let sender = pc.add_track(track.as_track_local()).await.map_err(|e| {
                AppError::WebRtcError(format!("Failed to add {} track: {}", track.kind(), e))
            })?;
            info!(
                "{} track added to peer connection (session {})",
                track.mime_type(),
                session_id
            );

            let events = events.clone();
            let session_id = session_id.clone();
            let label = track.kind().to_string();
            tokio::spawn(async move {
                let reads = drain(sender.as_ref(), &label).await;
                events.publish(SystemEvent::FeedbackDrainFinished {
                    session_id,
                    track: label,
                    reads,
                });
            });
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::New);

        let session = Self {
            session_id,
            created_at: Utc::now(),
            pc,
            video_track,
            audio_track,
            state: Arc::new(state_tx),
            state_rx,
            negotiation: Mutex::new(NegotiationState::Fresh),
            playback: Mutex::new(PlaybackSlot::Idle),
            pipelines: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            gathering_timeout: config.gathering_timeout(),
            events,
        };

        session.setup_event_handlers();
        session.events.publish(SystemEvent::SessionCreated {
            session_id: session.session_id.clone(),
        });

        Ok(session)
    }

    fn setup_event_handlers(&self) {
        let state = self.state.clone();
        let session_id = self.session_id.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();

        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let state = state.clone();
                let session_id = session_id.clone();
                let events = events.clone();
                let cancel = cancel.clone();

                Box::pin(async move {
                    if s == RTCPeerConnectionState::Unspecified {
                        return;
                    }
                    let new_state = ConnectionState::from(s);

                    info!("Session {} connection state: {}", session_id, new_state);
                    let _ = state.send(new_state);
                    events.publish(SystemEvent::SessionStateChanged {
                        session_id: session_id.clone(),
                        state: new_state,
                    });

                    if new_state.is_terminal() {
                        cancel.cancel();
                    }
                })
            }));

        let session_id = self.session_id.clone();
        self.pc
            .on_ice_gathering_state_change(Box::new(move |state| {
                let session_id = session_id.clone();
                Box::pin(async move {
                    debug!("[ICE] Session {} gathering state: {:?}", session_id, state);
                })
            }));
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        *self.negotiation.lock()
    }

    pub fn playback_slot(&self) -> PlaybackSlot {
        *self.playback.lock()
    }

    /// Pipelines started by the last playback request
    pub fn pipelines(&self) -> Vec<Arc<Pipeline>> {
        self.pipelines.lock().clone()
    }

    /// Closed explicitly or connection failed/closed
    pub fn is_terminal(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.state().is_terminal()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            connection_state: self.state(),
            negotiation_state: self.negotiation_state(),
            playback: self.playback_slot(),
            pipelines: self.pipelines().iter().map(|p| p.status()).collect(),
            tracks: TrackStatus {
                video: self.video_track.stats(),
                audio: self.audio_track.stats(),
            },
        }
    }

    /// Committed remote description, if any
    pub async fn remote_description(&self) -> Option<SessionDescription> {
        self.pc.remote_description().await.map(Into::into)
    }

    /// Committed local description, if any
    pub async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(Into::into)
    }

    fn set_negotiation(&self, state: NegotiationState) {
        *self.negotiation.lock() = state;
    }

    /// Signaling exchange: apply an offer and return the final answer
    ///
    /// The answer is returned only after ICE gathering completed, so it
    /// carries every local candidate. Allowed once per session.
    pub async fn negotiate(&self, offer: &[u8]) -> Result<SessionDescription> {
        let offer = parse_offer(offer)?;

        {
            let mut negotiation = self.negotiation.lock();
            if *negotiation != NegotiationState::Fresh {
                return Err(AppError::RenegotiationNotSupported(self.session_id.clone()));
            }
            *negotiation = NegotiationState::Negotiating;
        }

        if let Err(e) = self.pc.set_remote_description(offer).await {
            self.set_negotiation(NegotiationState::Fresh);
            return Err(AppError::IncompatibleOffer(e.to_string()));
        }

        match self.complete_answer().await {
            Ok(answer) => {
                self.set_negotiation(NegotiationState::Negotiated);
                let candidates = answer.candidate_count();
                info!(
                    "Session {} negotiated ({} local candidates)",
                    self.session_id, candidates
                );
                self.events.publish(SystemEvent::SessionNegotiated {
                    session_id: self.session_id.clone(),
                    candidates,
                });
                Ok(answer)
            }
            Err(e) => {
                warn!("Session {} negotiation failed: {}", self.session_id, e);
                self.set_negotiation(NegotiationState::Broken);
                Err(e)
            }
        }
    }

    async fn complete_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::IncompatibleOffer(format!("Failed to create answer: {}", e)))?;

        // Must be obtained before set_local_description starts gathering
        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| {
                AppError::WebRtcError(format!("Failed to set local description: {}", e))
            })?;

        let timeout = self.gathering_timeout;
        if tokio::time::timeout(timeout, gather_complete.recv())
            .await
            .is_err()
        {
            return Err(AppError::GatheringTimeout(timeout.as_millis() as u64));
        }

        self.pc
            .local_description()
            .await
            .map(SessionDescription::from)
            .ok_or_else(|| AppError::Internal("Local description missing after gathering".into()))
    }

    /// Claim the playback slot
    ///
    /// Fails while another trigger is negotiating or any pipeline of the
    /// previous trigger has not reached a terminal state.
    pub fn reserve_playback(&self) -> Result<()> {
        let mut slot = self.playback.lock();
        let busy = match *slot {
            PlaybackSlot::Idle => false,
            PlaybackSlot::Reserved => true,
            PlaybackSlot::Running => self
                .pipelines
                .lock()
                .iter()
                .any(|p| !p.state().is_terminal()),
        };
        if busy {
            return Err(AppError::PipelineAlreadyRunning(self.session_id.clone()));
        }
        *slot = PlaybackSlot::Reserved;
        Ok(())
    }

    /// Give back a reservation that will not start pipelines
    pub fn release_playback(&self) {
        let mut slot = self.playback.lock();
        if *slot == PlaybackSlot::Reserved {
            *slot = PlaybackSlot::Idle;
        }
    }

    /// Media trigger: reserve, negotiate, then start one pipeline per file
    pub async fn play(
        &self,
        offer: &[u8],
        media: MediaSet,
        settings: PlaybackSettings,
    ) -> Result<SessionDescription> {
        self.reserve_playback()?;

        let answer = match self.negotiate(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                self.release_playback();
                return Err(e);
            }
        };

        self.start_playback(media, settings);
        Ok(answer)
    }

    /// Spawn the video and/or audio pipeline
    pub fn start_playback(&self, media: MediaSet, settings: PlaybackSettings) {
        let mut started = Vec::new();

        if let Some(path) = media.video {
            let pacing = settings.pacing.clone();
            started.push(self.spawn_pipeline(
                PipelineKind::Video,
                self.video_track.clone(),
                settings.wait_for_connected,
                move || open_video(path, &pacing),
            ));
        }

        if let Some(path) = media.audio {
            let pacing = settings.pacing.clone();
            let verify = settings.verify_ogg_checksum;
            started.push(self.spawn_pipeline(
                PipelineKind::Audio,
                self.audio_track.clone(),
                settings.wait_for_connected,
                move || open_audio(path, &pacing, verify),
            ));
        }

        info!(
            "Session {} started {} pipeline(s)",
            self.session_id,
            started.len()
        );
        *self.pipelines.lock() = started;
        *self.playback.lock() = PlaybackSlot::Running;
    }

    fn spawn_pipeline<S, C, O>(
        &self,
        kind: PipelineKind,
        track: Arc<OutboundTrack>,
        wait_for_connected: bool,
        open: O,
    ) -> Arc<Pipeline>
    where
        S: SampleSource + 'static,
        C: PacingClock + 'static,
        O: FnOnce() -> Result<(S, C)> + Send + 'static,
    {
        let pipeline =
            Arc::new(Pipeline::new(kind, self.session_id.clone()).with_events(self.events.clone()));
        let cancel = self.cancel.child_token();
        let state_rx = self.state_watch();

        let task_pipeline = pipeline.clone();
        tokio::spawn(async move {
            if wait_for_connected && !wait_until_connected(state_rx, &cancel).await {
                task_pipeline.stop_before_start();
                return;
            }

            let report = task_pipeline
                .run_guarded(open, track.as_ref(), &cancel)
                .await;
            debug!(
                "{} pipeline finished: {} ({} units)",
                report.kind, report.state, report.units_sent
            );
        });

        pipeline
    }

    /// Stop pipelines and close the peer connection
    pub async fn close(&self, reason: &str) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.cancel.cancel();

        let result = self
            .pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to close peer connection: {}", e)));
        self.finish_close(reason, result)
    }

    /// Publish the closed state whatever the transport teardown returned
    fn finish_close(&self, reason: &str, result: Result<()>) -> Result<()> {
        let _ = self.state.send(ConnectionState::Closed);
        self.events.publish(SystemEvent::SessionClosed {
            session_id: self.session_id.clone(),
            reason: reason.to_string(),
        });

        match &result {
            Ok(()) => info!("Session {} closed: {}", self.session_id, reason),
            Err(e) => warn!("Session {} closed ({}) with error: {}", self.session_id, reason, e),
        }
        result
    }
}

type FileReader = std::io::BufReader<std::fs::File>;

fn open_video(path: PathBuf, pacing: &PacingConfig) -> Result<(FrameSource<FileReader>, IntervalClock)> {
    let source = FrameSource::open(&path)?;
    let period = source.timebase().tick_period();
    let source = source.with_announced_duration(pacing.video_announced_duration(period));
    Ok((source, IntervalClock::new(period)))
}

fn open_audio(
    path: PathBuf,
    pacing: &PacingConfig,
    verify_checksum: bool,
) -> Result<(PageSource<FileReader>, IntervalClock)> {
    let source = PageSource::open(&path, pacing.audio_sample_rate, verify_checksum)?;
    Ok((source, IntervalClock::new(pacing.audio_page_interval())))
}

/// Wait until the connection is up
///
/// Returns false when cancelled or when the connection reaches a terminal
/// state first.
async fn wait_until_connected(
    mut state_rx: watch::Receiver<ConnectionState>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        let state = *state_rx.borrow_and_update();
        if state == ConnectionState::Connected {
            return true;
        }
        if state.is_terminal() {
            return false;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}
