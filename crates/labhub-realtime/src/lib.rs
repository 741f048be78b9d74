//! # labhub-realtime
//!
//! Real-time delivery for LabHub. Provides:
//!
//! - An in-memory pub/sub bus for single-node deployments
//! - A Redis pub/sub bus for multi-node deployments (`redis-pubsub` feature)
//! - [`ChannelEmitter`], an [`EventEmitter`](labhub_core::traits::EventEmitter)
//!   that a transport layer drains into its client stream

pub mod bridge;
pub mod emitter;

pub use bridge::memory_pubsub::MemoryPubSub;
pub use bridge::redis_pubsub::RedisPubSub;
pub use bridge::build_pubsub;
pub use emitter::{ChannelEmitter, EventStream};
