use super::types::{ChannelType, PresenceMemberInfo};
use crate::app::auth::AuthVerifier;
use crate::app::config::App;
use crate::error::{Error, Result};
use crate::gateway::{ConnectionGateway, ConnectionHandle};
use crate::presence::PresenceTracker;
use crate::protocol::messages::{PresenceData, PusherMessage};
use crate::store::SharedStateStore;
use crate::sync::SyncAdapter;
use crate::utils;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Orchestrates channel membership: name validation, the auth gate for
/// private/presence channels, local roster changes, shared-store presence
/// transitions and the resulting broadcasts.
pub struct ChannelManager {
    gateway: Arc<ConnectionGateway>,
    store: Arc<dyn SharedStateStore>,
    sync: Arc<dyn SyncAdapter>,
    verifier: Arc<AuthVerifier>,
    presence: PresenceTracker,
}

impl ChannelManager {
    pub fn new(
        gateway: Arc<ConnectionGateway>,
        store: Arc<dyn SharedStateStore>,
        sync: Arc<dyn SyncAdapter>,
        verifier: Arc<AuthVerifier>,
    ) -> Self {
        let presence = PresenceTracker::new(store.clone(), sync.clone());
        ChannelManager {
            gateway,
            store,
            sync,
            verifier,
            presence,
        }
    }

    /// Handles a subscribe frame. Returns the `subscription_succeeded` frame
    /// to send back; repeated subscribes to the same channel return it again
    /// without any new side effects.
    pub async fn subscribe(
        &self,
        app: &App,
        handle: &Arc<ConnectionHandle>,
        channel: &str,
        auth: Option<&str>,
        channel_data: Option<&str>,
    ) -> Result<PusherMessage> {
        let max_length = app
            .max_channel_name_length
            .map(|n| n as usize)
            .unwrap_or_else(utils::default_channel_name_limit);
        utils::validate_channel_name(channel, max_length)?;

        let channel_type = ChannelType::from_name(channel);
        if channel_type.requires_authentication() {
            let auth = auth.ok_or(Error::Unauthorized)?;
            self.verifier.verify_channel_subscription(
                app,
                &handle.socket_id,
                channel,
                channel_data,
                auth,
            )?;
        }

        let member = if channel_type.is_presence() {
            Some(Self::parse_member(channel_data)?)
        } else {
            None
        };

        let namespace = self.gateway.namespace(&app.id);
        let newly_added = namespace.add_to_channel(channel, &handle.socket_id);
        handle.subscriptions.insert(channel.to_string());

        if let Some(member) = member {
            if newly_added {
                handle.presence.insert(channel.to_string(), member.clone());
                let first_connection = self
                    .store
                    .presence_join(&app.id, channel, &member, &handle.socket_id)
                    .await?;
                if first_connection {
                    debug!(app_id = %app.id, %channel, user_id = %member.user_id, "presence member joined");
                    self.sync
                        .announce_membership(
                            &app.id,
                            channel,
                            PusherMessage::member_added(
                                channel.to_string(),
                                member.user_id.clone(),
                                member.user_info.clone(),
                            ),
                            Some(&handle.socket_id),
                        )
                        .await?;
                }
            }
            let presence_data = self.roster_snapshot(&app.id, channel).await?;
            Ok(PusherMessage::subscription_succeeded(
                channel.to_string(),
                Some(presence_data),
            ))
        } else {
            Ok(PusherMessage::subscription_succeeded(
                channel.to_string(),
                None,
            ))
        }
    }

    /// Handles an unsubscribe frame or one channel of a disconnect. Unknown
    /// memberships are a no-op.
    pub async fn unsubscribe(
        &self,
        app_id: &str,
        handle: &Arc<ConnectionHandle>,
        channel: &str,
    ) -> Result<()> {
        let namespace = self.gateway.namespace(app_id);
        namespace.remove_from_channel(channel, &handle.socket_id);
        handle.subscriptions.remove(channel);

        // The namespace may have evicted this socket already (dead-socket
        // cleanup during a broadcast), so presence teardown keys off the
        // connection's own presence binding, not the namespace result.
        if let Some((_, member)) = handle.presence.remove(channel) {
            self.presence
                .handle_member_left(app_id, channel, &member.user_id, &handle.socket_id)
                .await?;
        }
        Ok(())
    }

    /// Tears down every membership of a closed connection, then drops it from
    /// the namespace.
    pub async fn handle_disconnect(&self, app_id: &str, handle: &Arc<ConnectionHandle>) {
        let channels: Vec<String> = handle.subscriptions.iter().map(|c| c.clone()).collect();
        for channel in channels {
            if let Err(e) = self.unsubscribe(app_id, handle, &channel).await {
                debug!(
                    socket_id = %handle.socket_id,
                    %channel,
                    "disconnect cleanup failed for channel: {e}"
                );
            }
        }
        self.gateway.namespace(app_id).remove_socket(&handle.socket_id);
    }

    /// Full roster for the `subscription_succeeded` payload.
    pub async fn roster_snapshot(&self, app_id: &str, channel: &str) -> Result<PresenceData> {
        let members = self.store.presence_members(app_id, channel).await?;
        let mut ids = Vec::with_capacity(members.len());
        let mut hash = HashMap::with_capacity(members.len());
        for (user_id, info) in members {
            ids.push(user_id.clone());
            hash.insert(user_id, info.user_info);
        }
        ids.sort();
        let count = ids.len();
        Ok(PresenceData { ids, hash, count })
    }

    /// Extracts the presence identity from the signed `channel_data` payload.
    fn parse_member(channel_data: Option<&str>) -> Result<PresenceMemberInfo> {
        let raw = channel_data.ok_or_else(|| {
            Error::WrongFormat("Presence subscription requires channel_data".to_string())
        })?;
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|_| Error::WrongFormat("channel_data is not valid JSON".to_string()))?;

        // user_id may legitimately arrive as a JSON number.
        let user_id = match value.get("user_id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::WrongFormat(
                    "channel_data must carry a user_id".to_string(),
                ))
            }
        };

        Ok(PresenceMemberInfo {
            user_id,
            user_info: value.get("user_info").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_parse_accepts_numeric_user_id() {
        let member = ChannelManager::parse_member(Some(r#"{"user_id": 42}"#)).unwrap();
        assert_eq!(member.user_id, "42");
        assert!(member.user_info.is_none());
    }

    #[test]
    fn member_parse_rejects_missing_user_id() {
        assert!(ChannelManager::parse_member(Some(r#"{"user_info": {}}"#)).is_err());
        assert!(ChannelManager::parse_member(Some("not json")).is_err());
        assert!(ChannelManager::parse_member(None).is_err());
    }
}
