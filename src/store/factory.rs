use super::memory::MemoryStateStore;
use super::redis::{RedisStateStore, RedisStateStoreConfig};
use super::SharedStateStore;
use crate::error::Result;
use crate::options::{StoreConfig, StoreDriver};
use std::sync::Arc;
use tracing::info;

pub struct StateStoreFactory;

impl StateStoreFactory {
    pub async fn create(config: &StoreConfig) -> Result<Arc<dyn SharedStateStore>> {
        info!(driver = ?config.driver, "initializing shared state store");
        match config.driver {
            StoreDriver::Memory => Ok(Arc::new(MemoryStateStore::new())),
            StoreDriver::Redis => {
                let store = RedisStateStore::new(RedisStateStoreConfig {
                    url: config.redis.url.clone(),
                    prefix: config.redis.key_prefix.clone(),
                })
                .await?;
                store.init().await?;
                Ok(Arc::new(store))
            }
        }
    }
}
