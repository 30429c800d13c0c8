use crate::error::{Error, Result};
use crate::sync::{BroadcastMessage, BroadcastTransport, TransportHandlers};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

const BUS_CAPACITY: usize = 1024;

/// In-process bus shared by transports cloned from it. Useful for exercising
/// the horizontal path without an external broker.
#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        MemoryBus { sender }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct MemoryTransport {
    bus: MemoryBus,
}

#[async_trait]
impl BroadcastTransport for MemoryTransport {
    type Config = MemoryBus;

    async fn new(bus: Self::Config) -> Result<Self> {
        Ok(MemoryTransport { bus })
    }

    async fn publish_broadcast(&self, message: &BroadcastMessage) -> Result<()> {
        self.bus
            .sender
            .send(message.clone())
            .map_err(|_| Error::Internal("bus has no listeners".to_string()))?;
        Ok(())
    }

    async fn start_listeners(&self, handlers: TransportHandlers) -> Result<()> {
        let mut receiver = self.bus.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(broadcast) => {
                        (handlers.on_broadcast)(broadcast).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "memory bus listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }

    async fn check_health(&self) -> Result<()> {
        Ok(())
    }
}
