// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Reconnect and polling policies for the deck bridge.
//!
//! Both are immutable per configuration epoch; ranges are clamped at
//! construction so the rest of the bridge never sees an out-of-range
//! value.

use std::time::Duration;

/// Floor for the configured initial reconnect delay, to avoid
/// hot-looping on a permanently broken port.
const RECONNECT_INITIAL_FLOOR: Duration = Duration::from_millis(250);

const STATUS_INTERVAL_MIN: Duration = Duration::from_millis(100);
const STATUS_INTERVAL_MAX: Duration = Duration::from_secs(10);
const TIMECODE_INTERVAL_MIN: Duration = Duration::from_millis(20);
const TIMECODE_INTERVAL_MAX: Duration = Duration::from_secs(5);

/// Reconnect behavior for a configuration epoch.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    enabled: bool,
    initial_delay: Duration,
    max_delay: Duration,
}

impl ReconnectConfig {
    /// Create a policy, clamping `initial_delay` to its floor and raising
    /// `max_delay` to at least `initial_delay`.
    pub fn new(enabled: bool, initial_delay: Duration, max_delay: Duration) -> Self {
        let initial_delay = initial_delay.max(RECONNECT_INITIAL_FLOOR);
        let max_delay = max_delay.max(initial_delay);
        Self {
            enabled,
            initial_delay,
            max_delay,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, RECONNECT_INITIAL_FLOOR, RECONNECT_INITIAL_FLOOR)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(true, Duration::from_secs(1), Duration::from_secs(15))
    }
}

/// Doubling backoff, clamped to the configured maximum.
///
/// The delay counter lives across attempts and resets only on a
/// successful open, so the next failure after a success starts again
/// from the initial delay.
#[derive(Debug, Clone, Default)]
pub struct ReconnectBackoff {
    current: Option<Duration>,
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay to use for the next reconnect attempt.
    pub fn next_delay(&mut self, config: &ReconnectConfig) -> Duration {
        let delay = match self.current {
            None => config.initial_delay(),
            Some(prev) => (prev * 2).min(config.max_delay()),
        };
        self.current = Some(delay);
        delay
    }

    /// Forget accumulated backoff after a successful open.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Poll cadence for the two independent read loops.
#[derive(Debug, Clone)]
pub struct PollConfig {
    status_enabled: bool,
    status_interval: Duration,
    timecode_enabled: bool,
    timecode_interval: Duration,
}

impl PollConfig {
    /// Create a poll plan, clamping both intervals to their allowed
    /// ranges.
    pub fn new(
        status_enabled: bool,
        status_interval: Duration,
        timecode_enabled: bool,
        timecode_interval: Duration,
    ) -> Self {
        Self {
            status_enabled,
            status_interval: status_interval.clamp(STATUS_INTERVAL_MIN, STATUS_INTERVAL_MAX),
            timecode_enabled,
            timecode_interval: timecode_interval
                .clamp(TIMECODE_INTERVAL_MIN, TIMECODE_INTERVAL_MAX),
        }
    }

    pub fn status_enabled(&self) -> bool {
        self.status_enabled
    }

    pub fn status_interval(&self) -> Duration {
        self.status_interval
    }

    pub fn timecode_enabled(&self) -> bool {
        self.timecode_enabled
    }

    pub fn timecode_interval(&self) -> Duration {
        self.timecode_interval
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(
            true,
            Duration::from_millis(500),
            true,
            Duration::from_millis(200),
        )
    }
}
