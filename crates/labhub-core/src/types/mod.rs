//! Shared value types: typed identifiers and pub/sub channel addressing.

pub mod channel;
pub mod id;

pub use channel::QueueChannel;
pub use id::{LabId, SessionId, UserId};
