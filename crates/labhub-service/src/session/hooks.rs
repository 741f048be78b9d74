//! In-process fan-out of session domain events.
//!
//! The lifecycle manager and the sweeper publish here after every terminal
//! write; the promotion listener subscribes to learn when a laboratory
//! gains a free slot.

use tokio::sync::broadcast;
use tracing::trace;

use labhub_core::events::SessionEvent;

/// Default buffer capacity for the hook channel.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hook for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionHooks {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionHooks {
    /// Create a hook with a specific buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped if none.
    pub fn publish(&self, event: SessionEvent) {
        trace!(?event, "Session hook");
        let _ = self.sender.send(event);
    }

    /// Subscribe to subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for SessionHooks {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
