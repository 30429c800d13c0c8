pub mod factory;
pub mod memory;
pub mod redis;

use crate::channel::types::PresenceMemberInfo;
use crate::error::Result;
use crate::gateway::SocketId;
use async_trait::async_trait;
use std::collections::HashMap;

/// Presence roster state shared by every node serving the same applications.
///
/// Join and leave are atomic per (app, channel, user): under concurrent calls
/// for the same user, exactly one join observes the first connection and
/// exactly one leave observes the last, so `member_added`/`member_removed`
/// frames are emitted exactly once per membership transition.
#[async_trait]
pub trait SharedStateStore: Send + Sync + 'static {
    async fn init(&self) -> Result<()>;

    /// Records one connection of `member` in a presence channel. Returns true
    /// when this is the user's first connection in the channel.
    async fn presence_join(
        &self,
        app_id: &str,
        channel: &str,
        member: &PresenceMemberInfo,
        socket_id: &SocketId,
    ) -> Result<bool>;

    /// Removes one connection of the user from a presence channel. Returns
    /// true when this was the user's last connection; false also covers
    /// connections the store never saw, so retries and double-leaves are
    /// harmless.
    async fn presence_leave(
        &self,
        app_id: &str,
        channel: &str,
        user_id: &str,
        socket_id: &SocketId,
    ) -> Result<bool>;

    /// Current roster, one entry per distinct user.
    async fn presence_members(
        &self,
        app_id: &str,
        channel: &str,
    ) -> Result<HashMap<String, PresenceMemberInfo>>;

    async fn presence_user_count(&self, app_id: &str, channel: &str) -> Result<usize>;

    async fn check_health(&self) -> Result<()>;
}
