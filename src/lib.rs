//! rtc-playout - single-peer WebRTC media playout
//!
//! Accepts a browser offer over HTTP, answers it once ICE gathering is
//! complete, and streams an IVF (VP8) video file and an Ogg (Opus) audio
//! file to the peer, each paced by its own clock.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod state;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
