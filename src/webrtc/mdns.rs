//! mDNS candidate policy
//!
//! Browsers hide host addresses behind `.local` names. We always resolve
//! those; publishing our own `.local` name is opt-in through
//! `RTC_PLAYOUT_MDNS_MODE`.

use webrtc::api::setting_engine::SettingEngine;
use webrtc::ice::mdns::MulticastDnsMode;

const MDNS_MODE_ENV: &str = "RTC_PLAYOUT_MDNS_MODE";

/// mDNS behavior of one peer connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MdnsPolicy {
    pub mode: MulticastDnsMode,
}

impl Default for MdnsPolicy {
    fn default() -> Self {
        Self {
            mode: MulticastDnsMode::QueryOnly,
        }
    }
}

impl MdnsPolicy {
    /// Read the policy from the environment, falling back to query-only
    pub fn from_env() -> Self {
        std::env::var(MDNS_MODE_ENV)
            .ok()
            .and_then(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }

    /// Accepts `off`/`query`/`gather` and a few boolean-style aliases
    pub fn parse(raw: &str) -> Option<Self> {
        let mode = match raw.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "false" | "0" => MulticastDnsMode::Disabled,
            "query" | "query_only" | "query-only" => MulticastDnsMode::QueryOnly,
            "gather" | "query_and_gather" | "query-and-gather" | "on" | "true" | "1" => {
                MulticastDnsMode::QueryAndGather
            }
            _ => return None,
        };
        Some(Self { mode })
    }

    pub fn label(&self) -> &'static str {
        match self.mode {
            MulticastDnsMode::Disabled => "disabled",
            MulticastDnsMode::QueryOnly => "query_only",
            MulticastDnsMode::QueryAndGather => "query_and_gather",
        }
    }

    /// Name published for host candidates when gathering is enabled
    pub fn host_name(session_id: &str) -> String {
        format!("{session_id}.local")
    }

    /// Configure a setting engine for the session
    pub fn apply(&self, engine: &mut SettingEngine, session_id: &str) {
        engine.set_ice_multicast_dns_mode(self.mode);
        if self.mode == MulticastDnsMode::QueryAndGather {
            engine.set_multicast_dns_host_name(Self::host_name(session_id));
        }
    }
}
