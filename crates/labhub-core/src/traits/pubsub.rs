//! Publish/subscribe message bus capability.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::result::AppResult;

/// A named-channel message bus.
///
/// Payloads are plain strings so the bus can be backed by an external
/// broker. Implementations deliver each published payload to every live
/// subscription of that channel; payloads published while nobody listens
/// are dropped.
#[async_trait]
pub trait PubSub: Send + Sync + fmt::Debug {
    /// Publish `payload` on `channel`, returning how many subscribers
    /// received it (best effort for remote brokers).
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<usize>;

    /// Open a subscription on `channel`.
    async fn subscribe(&self, channel: &str) -> AppResult<Subscription>;
}

type UnsubscribeHook = Box<dyn FnOnce() + Send>;

/// A live subscription to one channel.
///
/// Unsubscribing happens exactly once: explicitly through
/// [`Subscription::unsubscribe`] or implicitly when the value is dropped,
/// so no exit path can leak the underlying registration.
pub struct Subscription {
    channel: String,
    receiver: mpsc::Receiver<String>,
    on_unsubscribe: Option<UnsubscribeHook>,
}

impl Subscription {
    /// Wrap a receiver. `on_unsubscribe` releases the bus-side registration.
    pub fn new(
        channel: impl Into<String>,
        receiver: mpsc::Receiver<String>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// Channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next payload. Returns `None` once the bus side closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Release the subscription.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            self.receiver.close();
            hook();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("active", &self.on_unsubscribe.is_some())
            .finish()
    }
}
