use crate::app::config::App;
use crate::error::{Error, Result};
use crate::gateway::SocketId;
use crate::protocol::messages::{ApiEventData, MessageData, PusherMessage, TriggerEventRequest};
use crate::sync::SyncAdapter;
use crate::utils;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on channels addressed by a single trigger request.
const MAX_CHANNELS_PER_TRIGGER: usize = 100;

/// Fans authenticated trigger requests out to their channels. Authentication
/// happened upstream; this layer only validates shape and delivers.
pub struct EventDispatcher {
    sync: Arc<dyn SyncAdapter>,
}

impl EventDispatcher {
    pub fn new(sync: Arc<dyn SyncAdapter>) -> Self {
        EventDispatcher { sync }
    }

    pub async fn dispatch(&self, app: &App, request: TriggerEventRequest) -> Result<()> {
        let max_event_length = app
            .max_event_name_length
            .map(|n| n as usize)
            .unwrap_or_else(utils::default_event_name_limit);
        utils::validate_event_name(&request.name, max_event_length)?;

        let channels = Self::target_channels(&request)?;
        let max_channel_length = app
            .max_channel_name_length
            .map(|n| n as usize)
            .unwrap_or_else(utils::default_channel_name_limit);
        for channel in &channels {
            utils::validate_channel_name(channel, max_channel_length)?;
        }

        let except = request
            .socket_id
            .as_deref()
            .map(SocketId::parse)
            .transpose()?;

        let data = match &request.data {
            ApiEventData::String(s) => MessageData::String(s.clone()),
            ApiEventData::Json(v) => MessageData::String(v.to_string()),
        };

        for channel in channels {
            debug!(app_id = %app.id, %channel, event = %request.name, "dispatching event");
            let message = PusherMessage {
                channel: Some(channel.clone()),
                event: Some(request.name.clone()),
                data: Some(data.clone()),
                user_id: None,
            };
            self.sync
                .broadcast(&app.id, &channel, message, except.as_ref())
                .await?;
        }
        Ok(())
    }

    /// A trigger must address either `channel` or a non-empty `channels`
    /// list, never both.
    fn target_channels(request: &TriggerEventRequest) -> Result<Vec<String>> {
        match (&request.channel, &request.channels) {
            (Some(_), Some(_)) => Err(Error::WrongFormat(
                "Use either channel or channels, not both".to_string(),
            )),
            (Some(channel), None) => Ok(vec![channel.clone()]),
            (None, Some(channels)) if channels.is_empty() => Err(Error::WrongFormat(
                "channels must not be empty".to_string(),
            )),
            (None, Some(channels)) if channels.len() > MAX_CHANNELS_PER_TRIGGER => {
                Err(Error::WrongFormat(format!(
                    "Cannot trigger to more than {MAX_CHANNELS_PER_TRIGGER} channels"
                )))
            }
            (None, Some(channels)) => Ok(channels.clone()),
            (None, None) => Err(Error::WrongFormat(
                "Either channel or channels is required".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(channel: Option<&str>, channels: Option<Vec<&str>>) -> TriggerEventRequest {
        TriggerEventRequest {
            name: "order-created".to_string(),
            data: ApiEventData::String("{}".to_string()),
            channel: channel.map(str::to_string),
            channels: channels.map(|cs| cs.into_iter().map(str::to_string).collect()),
            socket_id: None,
        }
    }

    #[test]
    fn trigger_targets() {
        assert_eq!(
            EventDispatcher::target_channels(&request(Some("orders"), None)).unwrap(),
            vec!["orders".to_string()]
        );
        assert_eq!(
            EventDispatcher::target_channels(&request(None, Some(vec!["a", "b"]))).unwrap().len(),
            2
        );
        assert!(EventDispatcher::target_channels(&request(None, None)).is_err());
        assert!(EventDispatcher::target_channels(&request(Some("a"), Some(vec!["b"]))).is_err());
        assert!(EventDispatcher::target_channels(&request(None, Some(vec![]))).is_err());

        let many: Vec<String> = (0..101).map(|i| format!("c{i}")).collect();
        let many_refs: Vec<&str> = many.iter().map(String::as_str).collect();
        assert!(EventDispatcher::target_channels(&request(None, Some(many_refs))).is_err());
    }
}
