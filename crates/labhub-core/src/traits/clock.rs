//! Time sources.
//!
//! The lifecycle manager needs two kinds of time: wall-clock timestamps for
//! persisted `start_time`/`end_time`, and monotonic marks for deadlines.
//! Monotonic marks are [`tokio::time::Instant`] so that sleeping and deadline
//! arithmetic share one timeline (and so paused-time tests stay exact).

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Supplies current time and monotonic time marks.
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Current monotonic mark.
    fn mark(&self) -> Instant {
        Instant::now()
    }
}

/// Reads the system wall clock on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock time derived from the monotonic clock.
///
/// Samples the wall clock once at construction and advances it by monotonic
/// elapsed time afterwards, so reported timestamps never jump when the host
/// clock is adjusted.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    wall_anchor: DateTime<Utc>,
    mono_anchor: Instant,
}

impl MonotonicClock {
    /// Anchor at the current system time.
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor at an explicit wall-clock time.
    pub fn anchored_at(wall_anchor: DateTime<Utc>) -> Self {
        Self {
            wall_anchor,
            mono_anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.mono_anchor);
        self.wall_anchor + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero())
    }
}
