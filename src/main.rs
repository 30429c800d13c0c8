use driftwave::app::memory_registry::MemoryAppRegistry;
use driftwave::app::registry::AppRegistry;
use driftwave::error::Result;
use driftwave::gateway::ConnectionGateway;
use driftwave::options::ServerOptions;
use driftwave::server::{self, ServerContext};
use driftwave::store::factory::StateStoreFactory;
use driftwave::sync::factory::SyncAdapterFactory;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.json".to_string());
    let mut options = if Path::new(&config_path).exists() {
        ServerOptions::load_from_file(&config_path).await?
    } else {
        ServerOptions::default()
    };
    options.apply_env_overrides();

    let default_filter = if options.debug {
        "info,driftwave=debug"
    } else {
        "warn,driftwave=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!(port = options.port, "starting gateway");

    let app_registry: Arc<dyn AppRegistry> = Arc::new(MemoryAppRegistry::new());
    app_registry.init().await?;

    let gateway = Arc::new(ConnectionGateway::new());
    let store = StateStoreFactory::create(&options.store).await?;
    let sync = SyncAdapterFactory::create(&options.sync, gateway.clone()).await?;

    let context = Arc::new(ServerContext::new(
        options,
        app_registry,
        gateway,
        store,
        sync,
    ));

    server::run(context).await
}
