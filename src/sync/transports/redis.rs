use crate::error::{Error, Result};
use crate::sync::{BroadcastMessage, BroadcastTransport, TransportHandlers};
use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use std::cmp;
use tracing::{debug, error, warn};

#[derive(Clone, Debug)]
pub struct RedisTransportConfig {
    pub url: String,
    pub prefix: String,
}

impl Default for RedisTransportConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
            prefix: "gateway".to_string(),
        }
    }
}

/// Broadcast bus on Redis pub/sub. Publishing retries with backoff through
/// the auto-reconnecting connection manager; the subscriber loop rebuilds its
/// pub/sub connection whenever the stream drops.
#[derive(Clone)]
pub struct RedisTransport {
    client: redis::Client,
    connection: redis::aio::ConnectionManager,
    broadcast_channel: String,
}

#[async_trait]
impl BroadcastTransport for RedisTransport {
    type Config = RedisTransportConfig;

    async fn new(config: Self::Config) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| Error::Redis(format!("Failed to create Redis client: {e}")))?;

        let manager_config = redis::aio::ConnectionManagerConfig::new()
            .set_number_of_retries(5)
            .set_exponent_base(2)
            .set_factor(500)
            .set_max_delay(5000);

        let connection = client
            .get_connection_manager_with_config(manager_config)
            .await
            .map_err(|e| Error::Redis(format!("Failed to connect to Redis: {e}")))?;

        Ok(Self {
            client,
            connection,
            broadcast_channel: format!("{}:#broadcast", config.prefix),
        })
    }

    async fn publish_broadcast(&self, message: &BroadcastMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;

        let mut retry_delay = 100u64;
        const MAX_RETRIES: u32 = 3;
        const MAX_RETRY_DELAY: u64 = 1000;

        for attempt in 0..=MAX_RETRIES {
            let mut conn = self.connection.clone();
            match conn
                .publish::<_, _, i32>(&self.broadcast_channel, &payload)
                .await
            {
                Ok(_subscriber_count) => {
                    if attempt > 0 {
                        debug!(attempt, "broadcast publish succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        return Err(Error::Redis(format!(
                            "Failed to publish broadcast after {} attempts: {e}",
                            MAX_RETRIES + 1
                        )));
                    }
                    warn!(
                        attempt = attempt + 1,
                        retry_delay_ms = retry_delay,
                        "broadcast publish failed: {e}, retrying"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(retry_delay)).await;
                    retry_delay = cmp::min(retry_delay * 2, MAX_RETRY_DELAY);
                }
            }
        }

        Err(Error::Redis("broadcast publish retries exhausted".to_string()))
    }

    async fn start_listeners(&self, handlers: TransportHandlers) -> Result<()> {
        let sub_client = self.client.clone();
        let broadcast_channel = self.broadcast_channel.clone();

        tokio::spawn(async move {
            let mut retry_delay = 500u64;
            const MAX_RETRY_DELAY: u64 = 10_000;

            loop {
                let mut pubsub = match sub_client.get_async_pubsub().await {
                    Ok(pubsub) => {
                        retry_delay = 500;
                        pubsub
                    }
                    Err(e) => {
                        error!(
                            retry_delay_ms = retry_delay,
                            "failed to open pub/sub connection: {e}"
                        );
                        tokio::time::sleep(tokio::time::Duration::from_millis(retry_delay)).await;
                        retry_delay = cmp::min(retry_delay * 2, MAX_RETRY_DELAY);
                        continue;
                    }
                };

                if let Err(e) = pubsub.subscribe(&broadcast_channel).await {
                    error!(
                        retry_delay_ms = retry_delay,
                        "failed to subscribe to broadcast channel: {e}"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(retry_delay)).await;
                    retry_delay = cmp::min(retry_delay * 2, MAX_RETRY_DELAY);
                    continue;
                }

                debug!(channel = %broadcast_channel, "bus listener attached");

                let mut message_stream = pubsub.on_message();
                while let Some(msg) = message_stream.next().await {
                    let payload: String = match msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("ignoring unreadable bus payload: {e}");
                            continue;
                        }
                    };
                    match serde_json::from_str::<BroadcastMessage>(&payload) {
                        Ok(broadcast) => {
                            let handler = handlers.on_broadcast.clone();
                            tokio::spawn(async move {
                                handler(broadcast).await;
                            });
                        }
                        Err(e) => warn!("ignoring malformed bus broadcast: {e}"),
                    }
                }

                warn!("pub/sub stream ended, reconnecting");
            }
        });

        Ok(())
    }

    async fn check_health(&self) -> Result<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.connection.clone())
            .await
            .map_err(|e| Error::Redis(format!("Redis transport health check failed: {e}")))?;
        Ok(())
    }
}
