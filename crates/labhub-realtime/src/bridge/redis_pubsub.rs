//! Redis pub/sub bus for multi-node deployments.
//!
//! Publishing goes through a shared reconnecting connection. Each
//! subscription opens a dedicated pub/sub connection whose messages are
//! forwarded by a background task; unsubscribing aborts the task, which
//! drops the connection and with it the Redis-side subscription.

#[cfg(feature = "redis-pubsub")]
pub mod implementation {
    use async_trait::async_trait;
    use futures::StreamExt;
    use redis::aio::ConnectionManager;
    use tokio::sync::mpsc;
    use tracing::{debug, info, warn};

    use labhub_core::error::{AppError, ErrorKind};
    use labhub_core::result::AppResult;
    use labhub_core::traits::{PubSub, Subscription};

    /// Redis-backed message bus.
    #[derive(Clone)]
    pub struct RedisPubSub {
        /// Client used to open per-subscription connections.
        client: redis::Client,
        /// Shared connection for PUBLISH.
        conn: ConnectionManager,
        /// Buffer size per subscription.
        buffer_size: usize,
    }

    impl std::fmt::Debug for RedisPubSub {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisPubSub")
                .field("buffer_size", &self.buffer_size)
                .finish()
        }
    }

    impl RedisPubSub {
        /// Connect to Redis.
        pub async fn connect(url: &str, buffer_size: usize) -> AppResult<Self> {
            let client = redis::Client::open(url).map_err(|e| {
                AppError::with_source(ErrorKind::PubSub, "Failed to create Redis client", e)
            })?;

            let conn = ConnectionManager::new(client.clone()).await.map_err(|e| {
                AppError::with_source(ErrorKind::PubSub, "Failed to connect to Redis", e)
            })?;

            info!("Connected to Redis pub/sub");
            Ok(Self {
                client,
                conn,
                buffer_size: buffer_size.max(1),
            })
        }
    }

    #[async_trait]
    impl PubSub for RedisPubSub {
        async fn publish(&self, channel: &str, payload: &str) -> AppResult<usize> {
            let mut conn = self.conn.clone();
            let receivers = redis::cmd("PUBLISH")
                .arg(channel)
                .arg(payload)
                .query_async::<i64>(&mut conn)
                .await
                .map_err(|e| AppError::with_source(ErrorKind::PubSub, "Redis PUBLISH failed", e))?;

            Ok(receivers.max(0) as usize)
        }

        async fn subscribe(&self, channel: &str) -> AppResult<Subscription> {
            let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
                AppError::with_source(ErrorKind::PubSub, "Failed to open Redis pub/sub", e)
            })?;
            pubsub.subscribe(channel).await.map_err(|e| {
                AppError::with_source(ErrorKind::PubSub, "Redis SUBSCRIBE failed", e)
            })?;

            let (tx, rx) = mpsc::channel(self.buffer_size);
            let name = channel.to_string();
            let forwarder = tokio::spawn(async move {
                let mut messages = pubsub.into_on_message();
                while let Some(msg) = messages.next().await {
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(channel = %name, error = %e, "Undecodable Redis payload");
                            continue;
                        }
                    };
                    if tx.send(payload).await.is_err() {
                        break;
                    }
                }
                debug!(channel = %name, "Redis subscription forwarder stopped");
            });

            Ok(Subscription::new(channel, rx, move || forwarder.abort()))
        }
    }
}

#[cfg(not(feature = "redis-pubsub"))]
pub mod implementation {
    use async_trait::async_trait;

    use labhub_core::error::AppError;
    use labhub_core::result::AppResult;
    use labhub_core::traits::{PubSub, Subscription};

    /// Stub Redis bus when the `redis-pubsub` feature is disabled.
    #[derive(Debug, Clone)]
    pub struct RedisPubSub;

    impl RedisPubSub {
        /// Always fails: the binary was built without Redis support.
        pub async fn connect(_url: &str, _buffer_size: usize) -> AppResult<Self> {
            Err(disabled())
        }
    }

    #[async_trait]
    impl PubSub for RedisPubSub {
        async fn publish(&self, _channel: &str, _payload: &str) -> AppResult<usize> {
            Err(disabled())
        }

        async fn subscribe(&self, _channel: &str) -> AppResult<Subscription> {
            Err(disabled())
        }
    }

    fn disabled() -> AppError {
        AppError::configuration("Redis pub/sub requires the `redis-pubsub` feature")
    }
}

pub use implementation::RedisPubSub;
