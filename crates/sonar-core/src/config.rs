//! Poller and stream session tuning
//!
//! Millisecond fields keep the serde form aligned with the service's JSON
//! configuration vocabulary.

use serde::Deserialize;
use std::time::Duration;

/// Tuning for one polling session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Pause between fetch completions; slow fetches never overlap
    pub interval_ms: u64,
    /// Wall-clock cap on the whole session
    pub max_duration_ms: u64,
    /// Consecutive lookup failures before `on_error` fires (1 = every failure)
    pub error_notify_after: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_duration_ms: 300_000,
            error_notify_after: 1,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

/// Tuning for one stream session
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// End the session with an error when no chunk arrives within this
    /// window (disabled by default)
    pub idle_timeout_ms: Option<u64>,
    /// Ceiling on a single protocol unit's size; `None` keeps the decoder's
    /// built-in 256 KiB default
    pub max_unit_bytes: Option<usize>,
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}
