//! Pub/sub bus and client emitter configuration.

use serde::{Deserialize, Serialize};

/// Backing implementation of the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PubSubProvider {
    /// In-process channels (single node).
    #[default]
    Memory,
    /// Redis PUBLISH/SUBSCRIBE (multi-node).
    Redis,
}

impl std::fmt::Display for PubSubProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PubSubProvider::Memory => write!(f, "memory"),
            PubSubProvider::Redis => write!(f, "redis"),
        }
    }
}

/// Real-time delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Bus implementation.
    #[serde(default)]
    pub pubsub: PubSubProvider,
    /// Redis URL when `pubsub = "redis"`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Per-subscription buffer size.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Per-client event buffer size.
    #[serde(default = "default_emitter_buffer")]
    pub emitter_buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            pubsub: PubSubProvider::default(),
            redis_url: default_redis_url(),
            channel_buffer_size: default_channel_buffer(),
            emitter_buffer_size: default_emitter_buffer(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_channel_buffer() -> usize {
    64
}

fn default_emitter_buffer() -> usize {
    128
}
