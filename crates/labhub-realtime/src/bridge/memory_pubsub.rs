//! In-memory pub/sub for single-node deployments.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use labhub_core::result::AppResult;
use labhub_core::traits::{PubSub, Subscription};

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<String>,
}

/// In-memory pub/sub implementation.
///
/// Each subscription gets its own bounded buffer; a publish that finds a
/// buffer full drops the payload for that subscriber only.
#[derive(Debug)]
pub struct MemoryPubSub {
    /// Channel name → live subscribers
    channels: Arc<DashMap<String, Vec<Subscriber>>>,
    /// Subscriber id sequence
    next_id: AtomicU64,
    /// Buffer size per subscription
    buffer_size: usize,
}

impl MemoryPubSub {
    /// Create a new in-memory pub/sub
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Number of live subscriptions on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of channels with at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<usize> {
        let Some(subscribers) = self.channels.get(channel) else {
            debug!(channel = %channel, "Publish with no subscribers");
            return Ok(0);
        };

        let mut delivered = 0;
        for sub in subscribers.iter() {
            match sub.sender.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(channel = %channel, subscriber = sub.id, "Subscriber buffer full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> AppResult<Subscription> {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        let channels = Arc::clone(&self.channels);
        let name = channel.to_string();
        Ok(Subscription::new(channel, receiver, move || {
            if let Some(mut subs) = channels.get_mut(&name) {
                subs.retain(|s| s.id != id);
            }
            channels.remove_if(&name, |_, subs| subs.is_empty());
            debug!(channel = %name, subscriber = id, "Unsubscribed");
        }))
    }
}
