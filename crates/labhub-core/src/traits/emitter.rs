//! One-way push channel to a single connected client.
//!
//! The transport layer (server-sent events, WebSocket, ...) implements this
//! trait; LabHub only emits events and reacts to lifecycle callbacks.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::AppError;
use crate::events::client::EventKind;
use crate::result::AppResult;

/// Callback fired when the stream completes or times out.
pub type CompletionCallback = Box<dyn Fn() + Send + Sync>;

/// Callback fired when the stream fails.
pub type ErrorCallback = Box<dyn Fn(&AppError) + Send + Sync>;

/// Push channel to one remote client.
///
/// Implementations must invoke each registered callback at most once per
/// termination, from any thread. A callback registered after the stream has
/// already terminated must be invoked immediately.
#[async_trait]
pub trait EventEmitter: Send + Sync + Debug {
    /// Deliver an event to the client.
    async fn emit(&self, event: EventKind) -> AppResult<()>;

    /// Close the stream normally.
    fn complete(&self);

    /// Register a callback for normal completion (including client close).
    fn on_completion(&self, callback: CompletionCallback);

    /// Register a callback for stream failure.
    fn on_error(&self, callback: ErrorCallback);

    /// Register a callback for a transport-level timeout.
    fn on_timeout(&self, callback: CompletionCallback);
}
