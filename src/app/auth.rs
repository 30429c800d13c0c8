use super::config::App;
use super::registry::AppRegistry;
use crate::channel::types::ChannelType;
use crate::error::{Error, Result};
use crate::gateway::SocketId;
use crate::token::{body_md5, secure_compare, Token};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Maximum allowed skew between `auth_timestamp` and the server clock.
const TIMESTAMP_GRACE_SECONDS: i64 = 600;

/// The well-known auth query parameters carried on signed API requests.
#[derive(Debug, Deserialize, Default)]
pub struct ApiAuthParams {
    #[serde(default)]
    pub auth_key: String,
    #[serde(default)]
    pub auth_timestamp: String,
    #[serde(default = "default_auth_version")]
    pub auth_version: String,
    #[serde(default)]
    pub body_md5: String,
    #[serde(default)]
    pub auth_signature: String,
}

fn default_auth_version() -> String {
    "1.0".to_string()
}

/// Verifies request signatures against app secrets. Fail-closed: any lookup
/// failure or mismatch surfaces as an authentication error, never a pass.
pub struct AuthVerifier {
    registry: Arc<dyn AppRegistry>,
}

impl AuthVerifier {
    pub fn new(registry: Arc<dyn AppRegistry>) -> Self {
        AuthVerifier { registry }
    }

    /// Verifies a signed REST request against the app addressed by `app_id`.
    ///
    /// The signing base string is `METHOD \n PATH \n ordered-params`, where the
    /// params are every query parameter except `auth_signature`, keys
    /// lowercased, sorted lexicographically and joined as `key=value` with `&`.
    /// `body_md5` must be present and correct when the request carries a body,
    /// and absent otherwise.
    pub async fn verify_api_request(
        &self,
        app_id: &str,
        method: &str,
        path: &str,
        auth: &ApiAuthParams,
        query_params: &BTreeMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<()> {
        let app = self
            .registry
            .find_by_id(app_id)
            .await?
            .ok_or(Error::Unauthorized)?;

        if !app.enabled {
            return Err(Error::ApplicationDisabled);
        }

        if auth.auth_key != app.key {
            return Err(Error::Auth("Invalid auth_key".to_string()));
        }

        Self::check_timestamp(&auth.auth_timestamp)?;
        Self::check_body_md5(auth, query_params, body)?;

        let string_to_sign = Self::signing_base_string(method, path, query_params);
        let token = Token::new(app.key.clone(), app.secret.clone());
        let expected = token.sign(&string_to_sign);

        if !secure_compare(&expected, &auth.auth_signature) {
            debug!(app_id = %app.id, %path, "API signature mismatch");
            return Err(Error::Auth("Invalid API signature".to_string()));
        }

        Ok(())
    }

    fn check_timestamp(auth_timestamp: &str) -> Result<()> {
        let timestamp = auth_timestamp
            .parse::<i64>()
            .map_err(|_| Error::Auth("Invalid auth_timestamp".to_string()))?;

        let now = chrono::Utc::now().timestamp();
        if (now - timestamp).abs() > TIMESTAMP_GRACE_SECONDS {
            return Err(Error::Auth(format!(
                "Timestamp expired or too far in the future: {timestamp}"
            )));
        }
        Ok(())
    }

    fn check_body_md5(
        auth: &ApiAuthParams,
        query_params: &BTreeMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<()> {
        let declared = query_params
            .get("body_md5")
            .map(String::as_str)
            .unwrap_or(auth.body_md5.as_str());

        match body {
            Some(bytes) if !bytes.is_empty() || !declared.is_empty() => {
                if declared.is_empty() {
                    return Err(Error::Auth("Missing body_md5".to_string()));
                }
                let computed = body_md5(bytes);
                if !secure_compare(&computed, declared) {
                    return Err(Error::Auth("body_md5 mismatch".to_string()));
                }
                Ok(())
            }
            Some(_) => Ok(()),
            None => {
                if !declared.is_empty() {
                    return Err(Error::Auth(
                        "body_md5 must not be present without a request body".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Builds the canonical string that both client libraries and the server
    /// sign. `auth_signature` is excluded; everything else the caller sent is
    /// included verbatim (values are not re-encoded).
    pub fn signing_base_string(
        method: &str,
        path: &str,
        query_params: &BTreeMap<String, String>,
    ) -> String {
        let mut ordered: BTreeMap<String, &str> = BTreeMap::new();
        for (key, value) in query_params {
            let key = key.to_lowercase();
            if key != "auth_signature" {
                ordered.insert(key, value);
            }
        }

        let query_string = ordered
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}\n{}\n{}", method.to_uppercase(), path, query_string)
    }

    /// Verifies the `auth` field of a private/presence subscribe frame.
    ///
    /// Clients send `"<app_key>:<hex_hmac>"` over `"<socket_id>:<channel>"`
    /// for private channels and `"<socket_id>:<channel>:<channel_data>"` for
    /// presence channels.
    pub fn verify_channel_subscription(
        &self,
        app: &App,
        socket_id: &SocketId,
        channel: &str,
        channel_data: Option<&str>,
        auth: &str,
    ) -> Result<()> {
        let expected = Self::expected_subscription_signature(app, socket_id, channel, channel_data);
        if secure_compare(&expected, auth) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    pub fn expected_subscription_signature(
        app: &App,
        socket_id: &SocketId,
        channel: &str,
        channel_data: Option<&str>,
    ) -> String {
        let to_sign = if ChannelType::from_name(channel) == ChannelType::Presence {
            format!("{}:{}:{}", socket_id, channel, channel_data.unwrap_or(""))
        } else {
            format!("{socket_id}:{channel}")
        };

        let token = Token::new(app.key.clone(), app.secret.clone());
        format!("{}:{}", app.key, token.sign(&to_sign))
    }
}
