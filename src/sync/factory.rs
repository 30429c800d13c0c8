use super::horizontal::HorizontalSyncAdapter;
use super::local::LocalSyncAdapter;
use super::transports::{RedisTransport, RedisTransportConfig};
use super::{BroadcastTransport, SyncAdapter};
use crate::error::Result;
use crate::gateway::ConnectionGateway;
use crate::options::{SyncConfig, SyncDriver};
use std::sync::Arc;
use tracing::info;

pub struct SyncAdapterFactory;

impl SyncAdapterFactory {
    pub async fn create(
        config: &SyncConfig,
        gateway: Arc<ConnectionGateway>,
    ) -> Result<Arc<dyn SyncAdapter>> {
        info!(driver = ?config.driver, "initializing sync adapter");
        match config.driver {
            SyncDriver::Local => {
                let adapter = LocalSyncAdapter::new(gateway);
                adapter.init().await?;
                Ok(Arc::new(adapter))
            }
            SyncDriver::Redis => {
                let transport = RedisTransport::new(RedisTransportConfig {
                    url: config.redis.url.clone(),
                    prefix: config.redis.key_prefix.clone(),
                })
                .await?;
                let adapter = HorizontalSyncAdapter::new(gateway, transport);
                adapter.init().await?;
                Ok(Arc::new(adapter))
            }
        }
    }
}
