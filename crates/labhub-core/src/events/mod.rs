//! Events produced by LabHub.
//!
//! [`client`] holds the messages pushed to one connected client through an
//! [`EventEmitter`](crate::traits::EventEmitter); [`session`] holds the
//! in-process domain events that couple session completion to queue
//! promotion.

pub mod client;
pub mod session;

pub use client::{Event, EventKind, MessageType, RemainingTime, TimeUnit};
pub use session::{CompletionReason, SessionEvent};
