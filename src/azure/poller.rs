// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Polling cadence for ARM long-running operations.
//!
//! ARM answers an NSG write before the change is applied and hands back a
//! status URL. The client polls that URL, waiting as long as the server's
//! `Retry-After` asks or, without a hint, on an exponential schedule capped at
//! [`POLL_MAX_INTERVAL_SECS`].

use crate::constants::{
    DEFAULT_OPERATION_TIMEOUT_SECS, POLL_BACKOFF_MULTIPLIER, POLL_INITIAL_INTERVAL_MILLIS,
    POLL_MAX_INTERVAL_SECS,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Exponential backoff without jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Interval returned by the next call
    pub current_interval: Duration,
    /// Upper bound for any interval
    pub max_interval: Duration,
    /// Growth factor (2.0 doubles)
    pub multiplier: f64,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial_interval: Duration, max_interval: Duration, multiplier: f64) -> Self {
        Self {
            current_interval: initial_interval.min(max_interval),
            max_interval,
            multiplier,
        }
    }

    /// Return the current interval and grow the next one.
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval;
        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);
        interval
    }
}

/// Timing of long-running-operation polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// First poll delay when the server gives no hint
    pub initial_interval: Duration,
    /// Cap on the computed delay
    pub max_interval: Duration,
    /// Overall budget for one operation
    pub timeout: Duration,
}

impl PollSettings {
    /// Fresh backoff schedule for one operation.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            self.initial_interval,
            self.max_interval,
            POLL_BACKOFF_MULTIPLIER,
        )
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(POLL_INITIAL_INTERVAL_MILLIS),
            max_interval: Duration::from_secs(POLL_MAX_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        }
    }
}

/// Delay requested by a `Retry-After` header given in seconds.
///
/// HTTP-date values are not used by ARM and are ignored.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod poller_tests;
