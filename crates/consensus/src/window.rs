//! Vote window schedule for consensus rounds.
//!
//! Each round waits for peer votes until its window closes. Windows widen
//! linearly with the round number so that a retry after a short-handed
//! round gives slow peers more time:
//!
//! ```text
//! window(r) = min(base + delta * r, max) * jitter
//! ```
//!
//! Jitter stretches the window by a random factor in `[1.0, 1.0 + jitter]`
//! and the result is capped at `max` again.

use std::time::Duration;

use rand::Rng;
use threatmesh_config::ConsensusConfig;

/// Linear round window schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteWindow {
    /// Window for round 0
    pub base: Duration,
    /// Additional time per round
    pub delta: Duration,
    /// Hard cap on any window
    pub max: Duration,
    /// Random stretch in [0.0, 0.5]
    pub jitter: f64,
}

impl Default for VoteWindow {
    fn default() -> Self {
        Self::from_config(&ConsensusConfig::default())
    }
}

impl VoteWindow {
    /// Create a schedule without jitter.
    pub fn new(base: Duration, delta: Duration, max: Duration) -> Self {
        Self {
            base,
            delta,
            max,
            jitter: 0.0,
        }
    }

    /// Schedule described by the `[consensus]` section.
    pub fn from_config(config: &ConsensusConfig) -> Self {
        Self::new(
            Duration::from_millis(config.vote_window_ms),
            Duration::from_millis(config.window_delta_ms),
            Duration::from_millis(config.window_max_ms),
        )
        .with_jitter(f64::from(config.jitter_percent) / 100.0)
    }

    /// Set the jitter fraction, clamped to 0-50%.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.5);
        self
    }

    /// Window for `round` before jitter.
    pub fn nominal(&self, round: u32) -> Duration {
        self.base
            .saturating_add(self.delta.saturating_mul(round))
            .min(self.max)
    }

    /// Window for `round`, jitter applied.
    pub fn window(&self, round: u32) -> Duration {
        let nominal = self.nominal(round);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let stretch = 1.0 + rand::thread_rng().gen::<f64>() * self.jitter;
        Duration::from_secs_f64(nominal.as_secs_f64() * stretch).min(self.max)
    }
}
