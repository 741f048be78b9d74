//! Message bus implementations behind the [`PubSub`] capability.

pub mod memory_pubsub;
pub mod redis_pubsub;

use std::sync::Arc;

use tracing::info;

use labhub_core::config::{PubSubProvider, RealtimeConfig};
use labhub_core::result::AppResult;
use labhub_core::traits::PubSub;

use self::memory_pubsub::MemoryPubSub;

/// Build the bus selected by configuration.
pub async fn build_pubsub(config: &RealtimeConfig) -> AppResult<Arc<dyn PubSub>> {
    info!(provider = %config.pubsub, "Initializing pub/sub bus");

    match config.pubsub {
        PubSubProvider::Memory => Ok(Arc::new(MemoryPubSub::new(config.channel_buffer_size))),
        PubSubProvider::Redis => {
            let bus = redis_pubsub::RedisPubSub::connect(
                &config.redis_url,
                config.channel_buffer_size,
            )
            .await?;
            Ok(Arc::new(bus))
        }
    }
}
