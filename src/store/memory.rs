use super::SharedStateStore;
use crate::channel::types::PresenceMemberInfo;
use crate::error::Result;
use crate::gateway::SocketId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};

/// One user's presence record inside a channel roster.
struct MemberRecord {
    info: PresenceMemberInfo,
    sockets: HashSet<SocketId>,
}

type Roster = HashMap<String, MemberRecord>;

/// Single-process store. All roster mutations for a channel go through the
/// map's entry API, which holds the shard write lock for the whole
/// read-modify-write, giving the same per-user atomicity the Redis backend
/// gets from scripts.
pub struct MemoryStateStore {
    rosters: DashMap<(String, String), Roster>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        MemoryStateStore {
            rosters: DashMap::new(),
        }
    }

    fn key(app_id: &str, channel: &str) -> (String, String) {
        (app_id.to_string(), channel.to_string())
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStateStore for MemoryStateStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn presence_join(
        &self,
        app_id: &str,
        channel: &str,
        member: &PresenceMemberInfo,
        socket_id: &SocketId,
    ) -> Result<bool> {
        let mut roster = self
            .rosters
            .entry(Self::key(app_id, channel))
            .or_default();

        let record = roster
            .entry(member.user_id.clone())
            .or_insert_with(|| MemberRecord {
                info: member.clone(),
                sockets: HashSet::new(),
            });
        let was_empty = record.sockets.is_empty();
        record.sockets.insert(socket_id.clone());
        Ok(was_empty)
    }

    async fn presence_leave(
        &self,
        app_id: &str,
        channel: &str,
        user_id: &str,
        socket_id: &SocketId,
    ) -> Result<bool> {
        let key = Self::key(app_id, channel);
        let mut last = false;
        if let Some(mut roster) = self.rosters.get_mut(&key) {
            if let Some(record) = roster.get_mut(user_id) {
                record.sockets.remove(socket_id);
                if record.sockets.is_empty() {
                    roster.remove(user_id);
                    last = true;
                }
            }
        }
        self.rosters.remove_if(&key, |_, roster| roster.is_empty());
        Ok(last)
    }

    async fn presence_members(
        &self,
        app_id: &str,
        channel: &str,
    ) -> Result<HashMap<String, PresenceMemberInfo>> {
        Ok(self
            .rosters
            .get(&Self::key(app_id, channel))
            .map(|roster| {
                roster
                    .iter()
                    .map(|(user_id, record)| (user_id.clone(), record.info.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn presence_user_count(&self, app_id: &str, channel: &str) -> Result<usize> {
        Ok(self
            .rosters
            .get(&Self::key(app_id, channel))
            .map(|roster| roster.len())
            .unwrap_or(0))
    }

    async fn check_health(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user_id: &str) -> PresenceMemberInfo {
        PresenceMemberInfo {
            user_id: user_id.to_string(),
            user_info: Some(serde_json::json!({"name": user_id})),
        }
    }

    #[tokio::test]
    async fn second_connection_of_same_user_is_not_a_join() {
        let store = MemoryStateStore::new();
        let (s1, s2) = (SocketId::new(), SocketId::new());

        assert!(store
            .presence_join("app", "presence-room", &member("u1"), &s1)
            .await
            .unwrap());
        assert!(!store
            .presence_join("app", "presence-room", &member("u1"), &s2)
            .await
            .unwrap());
        assert_eq!(
            store.presence_user_count("app", "presence-room").await.unwrap(),
            1
        );

        assert!(!store
            .presence_leave("app", "presence-room", "u1", &s1)
            .await
            .unwrap());
        assert!(store
            .presence_leave("app", "presence-room", "u1", &s2)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn leave_of_unknown_connection_is_a_noop() {
        let store = MemoryStateStore::new();
        assert!(!store
            .presence_leave("app", "presence-room", "ghost", &SocketId::new())
            .await
            .unwrap());
    }
}
