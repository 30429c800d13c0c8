use super::{BroadcastMessage, BroadcastTransport, SyncAdapter, TransportHandlers};
use crate::error::Result;
use crate::gateway::{ConnectionGateway, SocketId};
use crate::protocol::messages::PusherMessage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Multi-node delivery. Local subscribers get the frame immediately; the same
/// frame goes out on the bus for every peer node, tagged with this node's id
/// so the listener can drop the echo.
pub struct HorizontalSyncAdapter<T: BroadcastTransport> {
    node_id: String,
    gateway: Arc<ConnectionGateway>,
    transport: T,
}

impl<T: BroadcastTransport + 'static> HorizontalSyncAdapter<T> {
    pub fn new(gateway: Arc<ConnectionGateway>, transport: T) -> Self {
        HorizontalSyncAdapter {
            node_id: uuid::Uuid::new_v4().to_string(),
            gateway,
            transport,
        }
    }

    fn deliver_remote(gateway: &ConnectionGateway, broadcast: BroadcastMessage) {
        let except = broadcast.except_socket_id.map(SocketId);
        gateway.namespace(&broadcast.app_id).broadcast_to_channel(
            &broadcast.channel,
            &broadcast.message,
            except.as_ref(),
        );
    }
}

#[async_trait]
impl<T: BroadcastTransport + 'static> SyncAdapter for HorizontalSyncAdapter<T> {
    async fn init(&self) -> Result<()> {
        let own_node_id = self.node_id.clone();
        let gateway = self.gateway.clone();

        let handlers = TransportHandlers {
            on_broadcast: Arc::new(move |broadcast: BroadcastMessage| {
                let gateway = gateway.clone();
                let own_node_id = own_node_id.clone();
                Box::pin(async move {
                    if broadcast.node_id == own_node_id {
                        return;
                    }
                    debug!(
                        from = %broadcast.node_id,
                        channel = %broadcast.channel,
                        "delivering bus broadcast"
                    );
                    Self::deliver_remote(&gateway, broadcast);
                })
            }),
        };

        self.transport.start_listeners(handlers).await
    }

    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn broadcast(
        &self,
        app_id: &str,
        channel: &str,
        message: PusherMessage,
        except: Option<&SocketId>,
    ) -> Result<()> {
        // Locals never wait on the bus.
        self.gateway
            .namespace(app_id)
            .broadcast_to_channel(channel, &message, except);

        let envelope = BroadcastMessage {
            node_id: self.node_id.clone(),
            app_id: app_id.to_string(),
            channel: channel.to_string(),
            message,
            except_socket_id: except.map(|id| id.0.clone()),
        };

        if let Err(e) = self.transport.publish_broadcast(&envelope).await {
            warn!(%channel, "bus publish failed: {e}");
            return Err(e);
        }
        Ok(())
    }

    async fn check_health(&self) -> Result<()> {
        self.transport.check_health().await
    }
}
