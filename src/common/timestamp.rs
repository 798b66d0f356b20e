// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Timestamp and time-bound utilities.
//!
//! All timestamps and watermarks are `i64` milliseconds. Time bounds are given
//! as [`Duration`] at definition time and normalised to milliseconds once.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds per second.
pub const MILLIS_PER_SECOND: i64 = 1_000;

/// Milliseconds per minute.
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;

/// Converts a duration to whole milliseconds.
///
/// Returns `None` when the duration does not fit in an `i64`.
#[must_use]
pub fn duration_to_millis(duration: Duration) -> Option<i64> {
    i64::try_from(duration.as_millis()).ok()
}

/// Returns true once `now` is at least `bound` milliseconds past `start`.
///
/// A partial match started at `t0` with bound `d` expires exactly when the
/// observed time reaches `t0 + d`, never earlier.
#[must_use]
#[inline]
pub const fn is_expired(now: i64, start: i64, bound: i64) -> bool {
    bound > 0 && now.saturating_sub(start) >= bound
}

/// Source of processing time exposed to conditions.
pub trait TimerService {
    /// Current processing time in milliseconds since the Unix epoch.
    fn current_processing_time(&self) -> i64;
}

/// Wall-clock [`TimerService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimerService;

impl TimerService for SystemTimerService {
    fn current_processing_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(duration_to_millis)
            .unwrap_or(0)
    }
}

/// [`TimerService`] frozen at a fixed instant. Used by hosts that drive
/// processing time themselves, and by tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTimerService(pub i64);

impl TimerService for FixedTimerService {
    fn current_processing_time(&self) -> i64 {
        self.0
    }
}
