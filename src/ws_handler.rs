use crate::app::config::App;
use crate::channel::types::ChannelType;
use crate::error::{Error, Result};
use crate::gateway::namespace::Namespace;
use crate::gateway::{ConnectionHandle, SocketId};
use crate::protocol::constants::PROTOCOL_VERSION;
use crate::protocol::messages::{MessageData, PusherMessage};
use crate::server::ServerContext;
use crate::utils;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// GET /app/{appKey}
pub async fn ws_upgrade(
    Path(app_key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(context): State<Arc<ServerContext>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_key, params, context))
}

async fn handle_socket(
    socket: WebSocket,
    app_key: String,
    params: HashMap<String, String>,
    context: Arc<ServerContext>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    if let Err(e) = negotiate_protocol(&params) {
        close_with_error(&mut ws_tx, e).await;
        return;
    }

    // The key in the URL decides the app; a bad key gets an error frame with
    // a non-reconnectable close code, not a silent drop.
    let app = match context.app_registry.find_by_key(&app_key).await {
        Ok(Some(app)) if app.enabled => app,
        Ok(Some(_)) => {
            close_with_error(&mut ws_tx, Error::ApplicationDisabled).await;
            return;
        }
        _ => {
            close_with_error(&mut ws_tx, Error::InvalidAppKey).await;
            return;
        }
    };

    let namespace = context.gateway.namespace(&app.id);
    if at_connection_capacity(&app, &namespace) {
        close_with_error(&mut ws_tx, Error::OverConnectionQuota).await;
        return;
    }

    let socket_id = SocketId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<PusherMessage>();
    let handle = Arc::new(ConnectionHandle::new(
        socket_id.clone(),
        app.id.clone(),
        tx,
    ));
    namespace.add_socket(handle.clone());

    info!(%socket_id, app_id = %app.id, "connection established");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(payload) = serde_json::to_string(&message) else {
                continue;
            };
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let established = PusherMessage::connection_established(
        socket_id.to_string(),
        context.options.activity_timeout,
    );
    if handle.send(established).is_err() {
        writer.abort();
        return;
    }

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match handle_frame(&context, &app, &handle, &text).await {
            Ok(()) => {}
            Err(e) => {
                debug!(%socket_id, close_code = e.close_code(), "frame error: {e}");
                let _ = handle.send(PusherMessage::error((&e).into(), None));
                if e.is_fatal() {
                    break;
                }
            }
        }
    }

    context
        .channel_manager
        .handle_disconnect(&app.id, &handle)
        .await;
    writer.abort();
    info!(%socket_id, "connection closed");
}

/// Clients report their protocol version as a query parameter. Anything newer
/// than what we speak (or unparsable) is refused before the session starts;
/// an absent parameter gets the current version.
fn negotiate_protocol(params: &HashMap<String, String>) -> Result<u8> {
    match params.get("protocol") {
        None => Ok(PROTOCOL_VERSION),
        Some(raw) => match raw.parse::<u8>() {
            Ok(version) if version >= 1 && version <= PROTOCOL_VERSION => Ok(version),
            _ => Err(Error::UnsupportedProtocolVersion),
        },
    }
}

fn at_connection_capacity(app: &App, namespace: &Namespace) -> bool {
    app.max_connections
        .is_some_and(|max| namespace.socket_count() >= max as usize)
}

async fn handle_frame(
    context: &Arc<ServerContext>,
    app: &App,
    handle: &Arc<ConnectionHandle>,
    text: &str,
) -> Result<()> {
    let message: PusherMessage = serde_json::from_str(text)
        .map_err(|_| Error::InvalidMessageFormat("frame is not valid JSON".to_string()))?;
    let event = message
        .event
        .as_deref()
        .ok_or_else(|| Error::InvalidMessageFormat("frame has no event".to_string()))?;

    match event {
        "pusher:ping" => handle.send(PusherMessage::pong()),
        "pusher:subscribe" => {
            let (channel, auth, channel_data) = subscribe_fields(&message)?;
            let succeeded = context
                .channel_manager
                .subscribe(app, handle, &channel, auth.as_deref(), channel_data.as_deref())
                .await?;
            handle.send(succeeded)
        }
        "pusher:unsubscribe" => {
            let channel = channel_field(&message).ok_or_else(|| {
                Error::InvalidMessageFormat("unsubscribe frame has no channel".to_string())
            })?;
            context
                .channel_manager
                .unsubscribe(&app.id, handle, &channel)
                .await
        }
        event if utils::is_client_event(event) => {
            handle_client_event(context, app, handle, event, &message).await
        }
        other => {
            warn!(socket_id = %handle.socket_id, event = other, "ignoring unknown event");
            Ok(())
        }
    }
}

/// Client events only flow on private/presence channels the sender is
/// actually subscribed to, and never echo back to the sender.
async fn handle_client_event(
    context: &Arc<ServerContext>,
    app: &App,
    handle: &Arc<ConnectionHandle>,
    event: &str,
    message: &PusherMessage,
) -> Result<()> {
    if !app.enable_client_messages {
        return Err(Error::Channel(
            "Client events are disabled for this app".to_string(),
        ));
    }

    let channel = message
        .channel
        .clone()
        .ok_or_else(|| Error::InvalidMessageFormat("client event has no channel".to_string()))?;

    if !ChannelType::from_name(&channel).requires_authentication() {
        return Err(Error::Channel(
            "Client events are not allowed on public channels".to_string(),
        ));
    }
    if !handle.subscriptions.contains(&channel) {
        return Err(Error::Channel(format!(
            "Client event on channel the socket is not subscribed to: {channel}"
        )));
    }

    let max_event_length = app
        .max_event_name_length
        .map(|n| n as usize)
        .unwrap_or_else(utils::default_event_name_limit);
    utils::validate_event_name(event, max_event_length)?;

    let user_id = handle
        .presence
        .get(&channel)
        .map(|member| member.user_id.clone());

    let outgoing = PusherMessage {
        channel: Some(channel.clone()),
        event: Some(event.to_string()),
        data: message.data.clone(),
        user_id,
    };
    context
        .sync
        .broadcast(&app.id, &channel, outgoing, Some(&handle.socket_id))
        .await
}

fn channel_field(message: &PusherMessage) -> Option<String> {
    if let Some(channel) = &message.channel {
        return Some(channel.clone());
    }
    match &message.data {
        Some(MessageData::Structured { channel, .. }) => channel.clone(),
        Some(MessageData::Json(value)) => value
            .get("channel")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn subscribe_fields(message: &PusherMessage) -> Result<(String, Option<String>, Option<String>)> {
    let (channel, auth, channel_data) = match &message.data {
        Some(MessageData::Structured {
            channel,
            auth,
            channel_data,
            ..
        }) => (channel.clone(), auth.clone(), channel_data.clone()),
        Some(MessageData::Json(value)) => (
            value
                .get("channel")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            value
                .get("auth")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            value
                .get("channel_data")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        ),
        _ => (None, None, None),
    };

    let channel = channel
        .ok_or_else(|| Error::InvalidMessageFormat("subscribe frame has no channel".to_string()))?;
    Ok((channel, auth, channel_data))
}

async fn close_with_error(
    ws_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
    error: Error,
) {
    let code = error.close_code();
    let frame = PusherMessage::error((&error).into(), None);
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = ws_tx.send(Message::Text(payload.into())).await;
    }
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: error.to_string().into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_field_extraction() {
        let raw = r#"{"event":"pusher:subscribe","data":{"channel":"private-a","auth":"k:s"}}"#;
        let message: PusherMessage = serde_json::from_str(raw).unwrap();
        let (channel, auth, channel_data) = subscribe_fields(&message).unwrap();
        assert_eq!(channel, "private-a");
        assert_eq!(auth.as_deref(), Some("k:s"));
        assert!(channel_data.is_none());
    }

    #[test]
    fn unsubscribe_channel_from_data() {
        let raw = r#"{"event":"pusher:unsubscribe","data":{"channel":"orders"}}"#;
        let message: PusherMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(channel_field(&message).as_deref(), Some("orders"));
    }

    #[test]
    fn protocol_negotiation() {
        let mut params = HashMap::new();
        assert_eq!(negotiate_protocol(&params).unwrap(), PROTOCOL_VERSION);

        params.insert("protocol".to_string(), "7".to_string());
        assert_eq!(negotiate_protocol(&params).unwrap(), 7);

        params.insert("protocol".to_string(), "99".to_string());
        assert!(negotiate_protocol(&params).is_err());
        params.insert("protocol".to_string(), "abc".to_string());
        assert!(negotiate_protocol(&params).is_err());
    }

    #[test]
    fn connection_quota_counts_namespace_sockets() {
        let namespace = Namespace::new("1".to_string());
        let app = App {
            max_connections: Some(1),
            ..Default::default()
        };
        assert!(!at_connection_capacity(&app, &namespace));

        let (tx, _rx) = mpsc::unbounded_channel();
        namespace.add_socket(Arc::new(ConnectionHandle::new(
            SocketId::new(),
            "1".to_string(),
            tx,
        )));
        assert!(at_connection_capacity(&app, &namespace));

        let unlimited = App::default();
        assert!(!at_connection_capacity(&unlimited, &namespace));
    }
}
