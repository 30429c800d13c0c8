use crate::error::Result;
use crate::gateway::SocketId;
use crate::protocol::messages::PusherMessage;
use crate::store::SharedStateStore;
use crate::sync::SyncAdapter;
use std::sync::Arc;
use tracing::{debug, warn};

const LEAVE_RETRIES: u32 = 3;
const LEAVE_RETRY_BASE_MS: u64 = 100;

/// Presence membership transitions shared by every removal path (explicit
/// unsubscribe and disconnect cleanup). Whether a `member_removed` goes out is
/// decided solely by the store's last-connection answer, so two nodes can
/// never both announce the same departure.
pub struct PresenceTracker {
    store: Arc<dyn SharedStateStore>,
    sync: Arc<dyn SyncAdapter>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn SharedStateStore>, sync: Arc<dyn SyncAdapter>) -> Self {
        PresenceTracker { store, sync }
    }

    /// Records one connection leaving and, when it was the user's last,
    /// broadcasts `member_removed`. The store write is retried with bounded
    /// backoff so a transient store error cannot strand a roster entry.
    pub async fn handle_member_left(
        &self,
        app_id: &str,
        channel: &str,
        user_id: &str,
        socket_id: &SocketId,
    ) -> Result<()> {
        let last_connection = self
            .leave_with_retry(app_id, channel, user_id, socket_id)
            .await?;

        if last_connection {
            debug!(%app_id, %channel, %user_id, "presence member left");
            self.sync
                .announce_membership(
                    app_id,
                    channel,
                    PusherMessage::member_removed(channel.to_string(), user_id.to_string()),
                    None,
                )
                .await?;
        }
        Ok(())
    }

    async fn leave_with_retry(
        &self,
        app_id: &str,
        channel: &str,
        user_id: &str,
        socket_id: &SocketId,
    ) -> Result<bool> {
        let mut delay = LEAVE_RETRY_BASE_MS;
        let mut attempt = 0;
        loop {
            match self
                .store
                .presence_leave(app_id, channel, user_id, socket_id)
                .await
            {
                Ok(last) => return Ok(last),
                Err(e) if attempt < LEAVE_RETRIES => {
                    attempt += 1;
                    warn!(
                        %channel,
                        %user_id,
                        attempt,
                        delay_ms = delay,
                        "presence leave failed: {e}, retrying"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
