//! Waiting-queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What triggers promotion of the head of a laboratory's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMode {
    /// Promote when this process persists a session as `Completed`.
    #[default]
    OnCompletion,
    /// Additionally poll laboratories with waiters on a fixed interval,
    /// catching completions persisted by other processes.
    Poll,
}

impl std::fmt::Display for PromotionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromotionMode::OnCompletion => write!(f, "on_completion"),
            PromotionMode::Poll => write!(f, "poll"),
        }
    }
}

/// Waiting-queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Promotion trigger.
    #[serde(default)]
    pub promotion: PromotionMode,
    /// Poll period when `promotion = "poll"`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            promotion: PromotionMode::default(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

impl QueueConfig {
    /// Poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }
}

fn default_poll_interval() -> u64 {
    10
}
