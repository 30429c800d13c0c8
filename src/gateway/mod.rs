pub mod namespace;

use crate::error::{Error, Result};
use crate::protocol::messages::PusherMessage;
use dashmap::{DashMap, DashSet};
use namespace::Namespace;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connection identifier in the `"<u32>.<u32>"` wire format clients embed in
/// subscription signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketId(pub String);

impl SocketId {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        SocketId(format!("{}.{}", rng.gen::<u32>(), rng.gen::<u32>()))
    }

    /// Accepts only the two-dotted-integers form. Anything else is rejected so
    /// a forged `socket_id` can never collide with internal map keys.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = match raw.split_once('.') {
            Some((a, b)) => a.parse::<u32>().is_ok() && b.parse::<u32>().is_ok(),
            None => false,
        };
        if valid {
            Ok(SocketId(raw.to_string()))
        } else {
            Err(Error::WrongFormat(format!("Invalid socket_id: {raw}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side handle for one live connection. Outgoing frames go through the
/// mpsc sender; the socket task owns the actual transport writer.
pub struct ConnectionHandle {
    pub socket_id: SocketId,
    pub app_id: String,
    sender: mpsc::UnboundedSender<PusherMessage>,
    /// Channels this socket is currently subscribed to.
    pub subscriptions: DashSet<String>,
    /// Presence identity per channel, kept for disconnect cleanup.
    pub presence: DashMap<String, crate::channel::types::PresenceMemberInfo>,
}

impl ConnectionHandle {
    pub fn new(
        socket_id: SocketId,
        app_id: String,
        sender: mpsc::UnboundedSender<PusherMessage>,
    ) -> Self {
        ConnectionHandle {
            socket_id,
            app_id,
            sender,
            subscriptions: DashSet::new(),
            presence: DashMap::new(),
        }
    }

    pub fn send(&self, message: PusherMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Per-node view of every namespace (one per application).
pub struct ConnectionGateway {
    namespaces: DashMap<String, Arc<Namespace>>,
}

impl ConnectionGateway {
    pub fn new() -> Self {
        ConnectionGateway {
            namespaces: DashMap::new(),
        }
    }

    pub fn namespace(&self, app_id: &str) -> Arc<Namespace> {
        self.namespaces
            .entry(app_id.to_string())
            .or_insert_with(|| Arc::new(Namespace::new(app_id.to_string())))
            .clone()
    }

    pub fn get_namespace(&self, app_id: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(app_id).map(|ns| ns.clone())
    }
}

impl Default for ConnectionGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_id_shape() {
        let id = SocketId::new();
        assert!(SocketId::parse(id.as_str()).is_ok());
        assert!(SocketId::parse("1234.5678").is_ok());
        assert!(SocketId::parse("1234").is_err());
        assert!(SocketId::parse("a.b").is_err());
        assert!(SocketId::parse("12.34.56").is_err());
        assert!(SocketId::parse("-1.5").is_err());
    }
}
