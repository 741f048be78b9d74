//! Session countdown configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing of the phased session countdown and the stale-session sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between `session_warning` events in the warning phase.
    #[serde(default = "default_notify_interval")]
    pub notify_interval_seconds: u64,
    /// Remaining time at which the countdown phase takes over.
    #[serde(default = "default_countdown_threshold")]
    pub countdown_threshold_seconds: u64,
    /// Interval between `session_ending` events in the countdown phase.
    #[serde(default = "default_tick")]
    pub tick_seconds: u64,
    /// How often InProgress sessions past their end time are swept.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// How far past its end time a session must be before the sweeper
    /// completes it. Leaves room for the owning run loop to finish first.
    #[serde(default = "default_sweep_grace")]
    pub sweep_grace_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            notify_interval_seconds: default_notify_interval(),
            countdown_threshold_seconds: default_countdown_threshold(),
            tick_seconds: default_tick(),
            sweep_interval_seconds: default_sweep_interval(),
            sweep_grace_seconds: default_sweep_grace(),
        }
    }
}

impl SessionConfig {
    /// Warning-phase sleep.
    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs(self.notify_interval_seconds.max(1))
    }

    /// Countdown-phase threshold.
    pub fn countdown_threshold(&self) -> Duration {
        Duration::from_secs(self.countdown_threshold_seconds)
    }

    /// Countdown-phase tick.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    /// Sweeper period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    /// Sweeper grace period.
    pub fn sweep_grace(&self) -> Duration {
        Duration::from_secs(self.sweep_grace_seconds)
    }
}

fn default_notify_interval() -> u64 {
    60
}

fn default_countdown_threshold() -> u64 {
    15
}

fn default_tick() -> u64 {
    1
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_grace() -> u64 {
    30
}
