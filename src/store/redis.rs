use super::SharedStateStore;
use crate::channel::types::PresenceMemberInfo;
use crate::error::{Error, Result};
use crate::gateway::SocketId;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::collections::HashMap;

/// Adds one connection for a user. Membership info is written only for the
/// first connection so a user's original channel_data wins over later ones.
/// Returns 1 when the user just became a member.
const JOIN_SCRIPT: &str = r#"
redis.call('SADD', KEYS[2], ARGV[2])
local count = redis.call('SCARD', KEYS[2])
if count == 1 then
    redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
    return 1
end
return 0
"#;

/// Drops one connection for a user. Returns 1 when it was the last one and
/// the user left the roster.
const LEAVE_SCRIPT: &str = r#"
local removed = redis.call('SREM', KEYS[2], ARGV[2])
if removed == 0 then
    return 0
end
if redis.call('SCARD', KEYS[2]) == 0 then
    redis.call('DEL', KEYS[2])
    redis.call('HDEL', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

#[derive(Clone, Debug)]
pub struct RedisStateStoreConfig {
    pub url: String,
    pub prefix: String,
}

impl Default for RedisStateStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
            prefix: "gateway".to_string(),
        }
    }
}

/// Roster store shared by every node through Redis. Per-user atomicity comes
/// from the scripts above: Redis runs each script as a single operation, so
/// concurrent joins or leaves for the same user serialize there.
pub struct RedisStateStore {
    connection: ConnectionManager,
    prefix: String,
    join_script: Script,
    leave_script: Script,
}

impl RedisStateStore {
    pub async fn new(config: RedisStateStoreConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| Error::Redis(format!("Failed to create Redis client: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Redis(format!("Failed to connect to Redis: {e}")))?;

        Ok(Self {
            connection,
            prefix: config.prefix,
            join_script: Script::new(JOIN_SCRIPT),
            leave_script: Script::new(LEAVE_SCRIPT),
        })
    }

    /// Hash of user_id -> serialized member info.
    fn members_key(&self, app_id: &str, channel: &str) -> String {
        format!("{}:presence:{}:{}:members", self.prefix, app_id, channel)
    }

    /// Set of socket ids backing one user's membership.
    fn connections_key(&self, app_id: &str, channel: &str, user_id: &str) -> String {
        format!(
            "{}:presence:{}:{}:user:{}",
            self.prefix, app_id, channel, user_id
        )
    }
}

#[async_trait]
impl SharedStateStore for RedisStateStore {
    async fn init(&self) -> Result<()> {
        self.check_health().await
    }

    async fn presence_join(
        &self,
        app_id: &str,
        channel: &str,
        member: &PresenceMemberInfo,
        socket_id: &SocketId,
    ) -> Result<bool> {
        let info = serde_json::to_string(member)?;
        let result: i64 = self
            .join_script
            .key(self.members_key(app_id, channel))
            .key(self.connections_key(app_id, channel, &member.user_id))
            .arg(&member.user_id)
            .arg(socket_id.as_str())
            .arg(info)
            .invoke_async(&mut self.connection.clone())
            .await
            .map_err(|e| Error::Redis(format!("presence join failed: {e}")))?;
        Ok(result == 1)
    }

    async fn presence_leave(
        &self,
        app_id: &str,
        channel: &str,
        user_id: &str,
        socket_id: &SocketId,
    ) -> Result<bool> {
        let result: i64 = self
            .leave_script
            .key(self.members_key(app_id, channel))
            .key(self.connections_key(app_id, channel, user_id))
            .arg(user_id)
            .arg(socket_id.as_str())
            .invoke_async(&mut self.connection.clone())
            .await
            .map_err(|e| Error::Redis(format!("presence leave failed: {e}")))?;
        Ok(result == 1)
    }

    async fn presence_members(
        &self,
        app_id: &str,
        channel: &str,
    ) -> Result<HashMap<String, PresenceMemberInfo>> {
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.members_key(app_id, channel))
            .query_async(&mut self.connection.clone())
            .await
            .map_err(|e| Error::Redis(format!("presence members lookup failed: {e}")))?;

        let mut members = HashMap::with_capacity(raw.len());
        for (user_id, info) in raw {
            members.insert(user_id, serde_json::from_str(&info)?);
        }
        Ok(members)
    }

    async fn presence_user_count(&self, app_id: &str, channel: &str) -> Result<usize> {
        let count: usize = redis::cmd("HLEN")
            .arg(self.members_key(app_id, channel))
            .query_async(&mut self.connection.clone())
            .await
            .map_err(|e| Error::Redis(format!("presence count lookup failed: {e}")))?;
        Ok(count)
    }

    async fn check_health(&self) -> Result<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.connection.clone())
            .await
            .map_err(|e| Error::Redis(format!("Redis health check failed: {e}")))?;
        Ok(())
    }
}
