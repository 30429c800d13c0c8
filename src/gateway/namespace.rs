use super::{ConnectionHandle, SocketId};
use crate::protocol::messages::PusherMessage;
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// All connections and channel memberships for a single application on this
/// node. Channel entries are created on first subscriber and removed when the
/// last one leaves.
pub struct Namespace {
    pub app_id: String,
    sockets: DashMap<SocketId, Arc<ConnectionHandle>>,
    channels: DashMap<String, DashSet<SocketId>>,
}

impl Namespace {
    pub fn new(app_id: String) -> Self {
        Namespace {
            app_id,
            sockets: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    pub fn add_socket(&self, handle: Arc<ConnectionHandle>) {
        self.sockets.insert(handle.socket_id.clone(), handle);
    }

    pub fn remove_socket(&self, socket_id: &SocketId) -> Option<Arc<ConnectionHandle>> {
        self.sockets.remove(socket_id).map(|(_, handle)| handle)
    }

    pub fn get_socket(&self, socket_id: &SocketId) -> Option<Arc<ConnectionHandle>> {
        self.sockets.get(socket_id).map(|entry| entry.clone())
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Adds the socket to a channel. Returns false when it was already there,
    /// which makes repeated subscribe frames idempotent.
    pub fn add_to_channel(&self, channel: &str, socket_id: &SocketId) -> bool {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(socket_id.clone())
    }

    /// Removes the socket from a channel and drops the channel entry if it
    /// became empty. `remove_if` re-checks emptiness under the shard write
    /// lock, so a concurrent subscriber cannot be lost.
    pub fn remove_from_channel(&self, channel: &str, socket_id: &SocketId) -> bool {
        let removed = match self.channels.get(channel) {
            Some(members) => members.remove(socket_id).is_some(),
            None => false,
        };
        self.channels
            .remove_if(channel, |_, members| members.is_empty());
        removed
    }

    pub fn channel_sockets(&self, channel: &str) -> HashSet<SocketId> {
        self.channels
            .get(channel)
            .map(|members| members.iter().map(|id| id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn channel_socket_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_in_channel(&self, channel: &str, socket_id: &SocketId) -> bool {
        self.channels
            .get(channel)
            .map(|members| members.contains(socket_id))
            .unwrap_or(false)
    }

    /// Fans a frame out to every channel subscriber on this node, skipping
    /// `except` (the sender, for client events and trigger exclusions). Sockets
    /// whose queues are gone are dropped from the roster on the spot.
    pub fn broadcast_to_channel(
        &self,
        channel: &str,
        message: &PusherMessage,
        except: Option<&SocketId>,
    ) -> usize {
        let targets = self.channel_sockets(channel);
        let mut delivered = 0;
        for socket_id in targets {
            if Some(&socket_id) == except {
                continue;
            }
            let Some(handle) = self.get_socket(&socket_id) else {
                self.remove_from_channel(channel, &socket_id);
                continue;
            };
            match handle.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(app_id = %self.app_id, %socket_id, %channel, "dropping closed socket from channel");
                    self.remove_from_channel(channel, &socket_id);
                }
            }
        }
        delivered
    }
}
