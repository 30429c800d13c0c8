use crate::channel::types::ChannelType;
use crate::error::Error;
use crate::protocol::messages::{PusherMessage, TriggerEventRequest};
use crate::server::ServerContext;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Wrong format.")]
    WrongFormat,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal Server Error: {0}")]
    InternalError(String),
    #[error("Serialization Error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> AxumResponse {
        let (status, error_message) = match &self {
            AppError::Unauthorized(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::WrongFormat => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Wrong format." }),
            ),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            AppError::SerializationError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("Serialization failed: {e}") }),
            ),
        };

        error!(error.message = %self, status_code = %status, "HTTP request failed");
        (status, Json(error_message)).into_response()
    }
}

// Lets handlers use `?` on internal errors. Unknown apps and bad signatures
// both collapse to 403 so the API leaks nothing about which apps exist.
impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        warn!(original_error = ?err, "mapping internal error to HTTP response");
        match err {
            Error::Unauthorized
            | Error::Auth(_)
            | Error::InvalidSignature
            | Error::InvalidAppKey
            | Error::ApplicationNotFound
            | Error::ApplicationDisabled => AppError::Unauthorized(err.to_string()),
            Error::WrongFormat(_) | Error::InvalidEventName(_) => AppError::WrongFormat,
            Error::InvalidChannelName(s) => AppError::InvalidInput(s),
            _ => AppError::InternalError(err.to_string()),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ChannelsQuery {
    #[serde(default)]
    pub filter_by_prefix: Option<String>,
}

/// GET /
pub async fn root() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// POST /apps/{appId}/events
pub async fn events(
    Path(app_id): Path<String>,
    State(context): State<Arc<ServerContext>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let app = context
        .app_registry
        .find_by_id(&app_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown app: {app_id}")))?;

    // Any structural problem with the body is the same client error.
    let request: TriggerEventRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::WrongFormat)?;

    context.dispatcher.dispatch(&app, request).await?;
    info!(%app_id, "event accepted");
    Ok((StatusCode::OK, Json(json!({ "message": "ok" }))))
}

/// GET /apps/{appId}/channels
pub async fn channels(
    Path(app_id): Path<String>,
    Query(query): Query<ChannelsQuery>,
    State(context): State<Arc<ServerContext>>,
) -> Result<impl IntoResponse, AppError> {
    let filter_prefix = query.filter_by_prefix.as_deref().unwrap_or("");

    let mut channels_info = HashMap::new();
    if let Some(namespace) = context.gateway.get_namespace(&app_id) {
        for name in namespace.channel_names() {
            if !name.starts_with(filter_prefix) {
                continue;
            }
            let count = namespace.channel_socket_count(&name);
            if count == 0 {
                continue;
            }
            channels_info.insert(
                name,
                json!({ "subscription_count": count, "occupied": true }),
            );
        }
    }

    Ok((
        StatusCode::OK,
        Json(PusherMessage::channels_list(channels_info)),
    ))
}

/// GET /apps/{appId}/channels/{channelName}
pub async fn channel(
    Path((app_id, channel_name)): Path<(String, String)>,
    State(context): State<Arc<ServerContext>>,
) -> Result<impl IntoResponse, AppError> {
    let subscription_count = context
        .gateway
        .get_namespace(&app_id)
        .map(|ns| ns.channel_socket_count(&channel_name))
        .unwrap_or(0);

    let user_count = if ChannelType::from_name(&channel_name).is_presence() {
        Some(context.store.presence_user_count(&app_id, &channel_name).await? as u64)
    } else {
        None
    };

    Ok((
        StatusCode::OK,
        Json(PusherMessage::channel_info(
            subscription_count > 0,
            subscription_count as u64,
            user_count,
        )),
    ))
}

/// GET /apps/{appId}/channels/{channelName}/users
pub async fn channel_users(
    Path((app_id, channel_name)): Path<(String, String)>,
    State(context): State<Arc<ServerContext>>,
) -> Result<impl IntoResponse, AppError> {
    if !ChannelType::from_name(&channel_name).is_presence() {
        return Err(AppError::InvalidInput(
            "Only presence channels support this endpoint".to_string(),
        ));
    }

    let members = context
        .store
        .presence_members(&app_id, &channel_name)
        .await?;

    let mut users: Vec<Value> = members
        .into_iter()
        .map(|(user_id, info)| match info.user_info {
            Some(user_info) => json!({ "id": user_id, "user_info": user_info }),
            None => json!({ "id": user_id }),
        })
        .collect();
    users.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

    Ok((StatusCode::OK, Json(json!({ "users": users }))))
}
