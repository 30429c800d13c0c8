use super::SyncAdapter;
use crate::error::Result;
use crate::gateway::{ConnectionGateway, SocketId};
use crate::protocol::messages::PusherMessage;
use async_trait::async_trait;
use std::sync::Arc;

/// Single-node delivery: every subscriber is on this gateway, so a broadcast
/// is just a local fan-out.
pub struct LocalSyncAdapter {
    node_id: String,
    gateway: Arc<ConnectionGateway>,
}

impl LocalSyncAdapter {
    pub fn new(gateway: Arc<ConnectionGateway>) -> Self {
        LocalSyncAdapter {
            node_id: uuid::Uuid::new_v4().to_string(),
            gateway,
        }
    }
}

#[async_trait]
impl SyncAdapter for LocalSyncAdapter {
    async fn init(&self) -> Result<()> {
        Ok(())
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
        self.gateway
            .namespace(app_id)
            .broadcast_to_channel(channel, &message, except);
        Ok(())
    }

    async fn check_health(&self) -> Result<()> {
        Ok(())
    }
}
