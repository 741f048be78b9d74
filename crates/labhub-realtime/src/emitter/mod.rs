//! Client event emitters.

pub mod channel;

pub use channel::{ChannelEmitter, EventStream, StreamTermination};
