use crate::app::config::App;
use crate::error::Result;
use async_trait::async_trait;

/// Resolves application identifiers to credentials. The core never assumes a
/// concrete storage backend behind this trait.
#[async_trait]
pub trait AppRegistry: Send + Sync + 'static {
    /// Initialize the registry (connect, warm caches, ...).
    async fn init(&self) -> Result<()>;

    /// Register or replace an application.
    async fn register_app(&self, config: App) -> Result<()>;

    /// Remove an application.
    async fn remove_app(&self, app_id: &str) -> Result<()>;

    /// All registered applications.
    async fn get_apps(&self) -> Result<Vec<App>>;

    /// Look up an app by its public key.
    async fn find_by_key(&self, key: &str) -> Result<Option<App>>;

    /// Look up an app by its id.
    async fn find_by_id(&self, app_id: &str) -> Result<Option<App>>;

    /// Health check for the registry backend.
    async fn check_health(&self) -> Result<()>;
}
