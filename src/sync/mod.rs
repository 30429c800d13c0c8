pub mod factory;
pub mod horizontal;
pub mod local;
pub mod transports;

use crate::error::Result;
use crate::gateway::SocketId;
use crate::protocol::messages::PusherMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Envelope published on the bus when a node fans an event out. `node_id`
/// lets the publisher skip its own copy; local delivery already happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub node_id: String,
    pub app_id: String,
    pub channel: String,
    pub message: PusherMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub except_socket_id: Option<String>,
}

pub struct TransportHandlers {
    pub on_broadcast: Arc<dyn Fn(BroadcastMessage) -> BoxFuture<'static, ()> + Send + Sync>,
}

/// Pub/sub bus between nodes. Delivery is at-least-once with per-publisher
/// ordering; consumers must tolerate duplicates.
#[async_trait]
pub trait BroadcastTransport: Send + Sync + Clone {
    type Config: Send + Sync;

    async fn new(config: Self::Config) -> Result<Self>;

    async fn publish_broadcast(&self, message: &BroadcastMessage) -> Result<()>;

    async fn start_listeners(&self, handlers: TransportHandlers) -> Result<()>;

    async fn check_health(&self) -> Result<()>;
}

/// How events reach channel subscribers, on this node and (for horizontal
/// deployments) on every other node serving the same apps.
#[async_trait]
pub trait SyncAdapter: Send + Sync + 'static {
    async fn init(&self) -> Result<()>;

    fn node_id(&self) -> &str;

    /// Delivers to local subscribers and, when a bus is attached, publishes
    /// for the rest of the cluster.
    async fn broadcast(
        &self,
        app_id: &str,
        channel: &str,
        message: PusherMessage,
        except: Option<&SocketId>,
    ) -> Result<()>;

    /// Membership announcements (`member_added`/`member_removed`) ride the
    /// same bus as event publishes.
    async fn announce_membership(
        &self,
        app_id: &str,
        channel: &str,
        message: PusherMessage,
        except: Option<&SocketId>,
    ) -> Result<()> {
        self.broadcast(app_id, channel, message, except).await
    }

    async fn check_health(&self) -> Result<()>;
}
