use super::config::App;
use super::registry::AppRegistry;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory registry, seeded from configuration at startup.
pub struct MemoryAppRegistry {
    apps: DashMap<String, App>,
}

impl Default for MemoryAppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAppRegistry {
    pub fn new() -> Self {
        Self {
            apps: DashMap::new(),
        }
    }
}

#[async_trait]
impl AppRegistry for MemoryAppRegistry {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn register_app(&self, config: App) -> Result<()> {
        self.apps.insert(config.id.clone(), config);
        Ok(())
    }

    async fn remove_app(&self, app_id: &str) -> Result<()> {
        self.apps.remove(app_id);
        Ok(())
    }

    async fn get_apps(&self) -> Result<Vec<App>> {
        Ok(self.apps.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<App>> {
        Ok(self
            .apps
            .iter()
            .find(|app| app.key == key)
            .map(|app| app.value().clone()))
    }

    async fn find_by_id(&self, app_id: &str) -> Result<Option<App>> {
        Ok(self.apps.get(app_id).map(|app| app.clone()))
    }

    async fn check_health(&self) -> Result<()> {
        Ok(())
    }
}
