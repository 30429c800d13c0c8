use crate::app::auth::AuthVerifier;
use crate::app::registry::AppRegistry;
use crate::channel::manager::ChannelManager;
use crate::dispatcher::EventDispatcher;
use crate::error::Result;
use crate::gateway::ConnectionGateway;
use crate::options::ServerOptions;
use crate::store::SharedStateStore;
use crate::sync::SyncAdapter;
use crate::{http_handler, middleware, ws_handler};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

/// Everything a request handler needs, shared across the HTTP and socket
/// surfaces.
pub struct ServerContext {
    pub options: ServerOptions,
    pub app_registry: Arc<dyn AppRegistry>,
    pub gateway: Arc<ConnectionGateway>,
    pub store: Arc<dyn SharedStateStore>,
    pub sync: Arc<dyn SyncAdapter>,
    pub verifier: Arc<AuthVerifier>,
    pub channel_manager: Arc<ChannelManager>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl ServerContext {
    pub fn new(
        options: ServerOptions,
        app_registry: Arc<dyn AppRegistry>,
        gateway: Arc<ConnectionGateway>,
        store: Arc<dyn SharedStateStore>,
        sync: Arc<dyn SyncAdapter>,
    ) -> Self {
        let verifier = Arc::new(AuthVerifier::new(app_registry.clone()));
        let channel_manager = Arc::new(ChannelManager::new(
            gateway.clone(),
            store.clone(),
            sync.clone(),
            verifier.clone(),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(sync.clone()));

        ServerContext {
            options,
            app_registry,
            gateway,
            store,
            sync,
            verifier,
            channel_manager,
            dispatcher,
        }
    }
}

fn cors_layer(options: &ServerOptions) -> CorsLayer {
    let origin = if options.cors.origin.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            options
                .cors
                .origin
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };
    let methods: Vec<Method> = options
        .cors
        .methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<HeaderName> = options
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
}

/// Builds the full route table. Every `/apps` route sits behind the request
/// signature middleware.
pub fn build_router(context: Arc<ServerContext>) -> Router {
    let api_routes = Router::new()
        .route("/apps/{appId}/events", post(http_handler::events))
        .route("/apps/{appId}/channels", get(http_handler::channels))
        .route(
            "/apps/{appId}/channels/{channelName}",
            get(http_handler::channel),
        )
        .route(
            "/apps/{appId}/channels/{channelName}/users",
            get(http_handler::channel_users),
        )
        .layer(axum::middleware::from_fn_with_state(
            context.clone(),
            middleware::api_auth_middleware,
        ));

    Router::new()
        .route("/", get(http_handler::root))
        .route("/app/{appKey}", get(ws_handler::ws_upgrade))
        .merge(api_routes)
        .layer(cors_layer(&context.options))
        .with_state(context)
}

/// Registers startup apps, binds and serves until a shutdown signal arrives.
pub async fn run(context: Arc<ServerContext>) -> Result<()> {
    for app in &context.options.apps {
        context.app_registry.register_app(app.clone()).await?;
        info!(app_id = %app.id, "registered application");
    }

    let addr = format!("{}:{}", context.options.host, context.options.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    let router = build_router(context);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
