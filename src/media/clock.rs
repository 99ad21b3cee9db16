//! Pacing Clock
//!
//! A re-arming periodic timer. Tick boundaries are anchored to the start
//! instant, so time spent demuxing or writing between ticks does not shift
//! later ticks. The first tick completes immediately.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Periodic timer driving one pipeline
#[async_trait]
pub trait PacingClock: Send {
    /// Nominal period between ticks
    fn period(&self) -> Duration;

    /// Wait for the next tick
    async fn tick(&mut self);
}

/// `PacingClock` backed by `tokio::time::Interval`
pub struct IntervalClock {
    interval: Interval,
    period: Duration,
}

impl IntervalClock {
    /// Create a clock with a fixed period
    ///
    /// A zero period is clamped to 1 ms so a malformed header cannot spin the loop.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = interval(period);
        // Late ticks are dropped rather than burst, keeping the start-anchored grid
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, period }
    }
}

#[async_trait]
impl PacingClock for IntervalClock {
    fn period(&self) -> Duration {
        self.period
    }

    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
