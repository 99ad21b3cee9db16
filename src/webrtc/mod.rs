//! WebRTC session layer
//!
//! One peer session with a VP8 video track and an Opus audio track, fed by
//! the media pipelines:
//!
//! ```text
//! Browser ──── offer (POST /signal, /video/) ───> PeerSession::negotiate
//!    ^                                                  |
//!    |                                      set remote, answer, gather
//!    |                                                  v
//!    +<──────────── answer (after gathering) ───────────+
//!    |
//!    +<── RTP ── OutboundTrack (video) <── Pipeline <── FrameSource (IVF)
//!    +<── RTP ── OutboundTrack (audio) <── Pipeline <── PageSource (Ogg)
//!    +─── RTCP ─> RTCRtpSender ─> feedback drain
//! ```

pub mod config;
pub mod mdns;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod track;

pub use config::WebRtcConfig;
pub use peer::{PeerSession, PlaybackSettings, PlaybackSlot, SessionStatus};
pub use session::SessionManager;
pub use signaling::{ConnectionState, NegotiationState, SdpType, SessionDescription};
pub use track::OutboundTrack;
