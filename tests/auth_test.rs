use driftwave::app::auth::{ApiAuthParams, AuthVerifier};
use driftwave::app::config::App;
use driftwave::app::memory_registry::MemoryAppRegistry;
use driftwave::app::registry::AppRegistry;
use driftwave::gateway::SocketId;
use driftwave::token::{body_md5, Token};
use std::collections::BTreeMap;
use std::sync::Arc;

fn test_app() -> App {
    App {
        id: "1".to_string(),
        key: "test-key".to_string(),
        secret: "test-secret".to_string(),
        ..Default::default()
    }
}

async fn verifier_with_app(app: App) -> AuthVerifier {
    let registry = Arc::new(MemoryAppRegistry::new());
    registry.register_app(app).await.unwrap();
    AuthVerifier::new(registry)
}

fn now_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Builds a correctly signed parameter set the way a client library would.
fn signed_params(
    app: &App,
    method: &str,
    path: &str,
    body: Option<&[u8]>,
    extra: &[(&str, &str)],
) -> (ApiAuthParams, BTreeMap<String, String>) {
    let mut params = BTreeMap::new();
    params.insert("auth_key".to_string(), app.key.clone());
    params.insert("auth_timestamp".to_string(), now_timestamp());
    params.insert("auth_version".to_string(), "1.0".to_string());
    if let Some(body) = body {
        params.insert("body_md5".to_string(), body_md5(body));
    }
    for (key, value) in extra {
        params.insert(key.to_string(), value.to_string());
    }

    let base = AuthVerifier::signing_base_string(method, path, &params);
    let signature = Token::new(app.key.clone(), app.secret.clone()).sign(&base);

    let auth = ApiAuthParams {
        auth_key: params["auth_key"].clone(),
        auth_timestamp: params["auth_timestamp"].clone(),
        auth_version: params["auth_version"].clone(),
        body_md5: params.get("body_md5").cloned().unwrap_or_default(),
        auth_signature: signature.clone(),
    };
    params.insert("auth_signature".to_string(), signature);
    (auth, params)
}

#[tokio::test]
async fn accepts_correctly_signed_request() {
    let app = test_app();
    let verifier = verifier_with_app(app.clone()).await;
    let body = br#"{"name":"ev","channel":"c","data":"{}"}"#;
    let (auth, params) = signed_params(&app, "POST", "/apps/1/events", Some(body), &[]);

    verifier
        .verify_api_request("1", "POST", "/apps/1/events", &auth, &params, Some(body))
        .await
        .unwrap();
}

#[tokio::test]
async fn rejects_flipped_parameter() {
    let app = test_app();
    let verifier = verifier_with_app(app.clone()).await;
    let (auth, mut params) = signed_params(
        &app,
        "GET",
        "/apps/1/channels",
        None,
        &[("filter_by_prefix", "presence-")],
    );

    // Signature was computed over the original prefix.
    params.insert("filter_by_prefix".to_string(), "private-".to_string());

    let result = verifier
        .verify_api_request("1", "GET", "/apps/1/channels", &auth, &params, None)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn rejects_unknown_app() {
    let verifier = verifier_with_app(test_app()).await;
    let (auth, params) = signed_params(&test_app(), "GET", "/apps/2/channels", None, &[]);

    let result = verifier
        .verify_api_request("2", "GET", "/apps/2/channels", &auth, &params, None)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn rejects_disabled_app() {
    let mut app = test_app();
    app.enabled = false;
    let verifier = verifier_with_app(app.clone()).await;
    let (auth, params) = signed_params(&app, "GET", "/apps/1/channels", None, &[]);

    let result = verifier
        .verify_api_request("1", "GET", "/apps/1/channels", &auth, &params, None)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn rejects_expired_timestamp() {
    let app = test_app();
    let verifier = verifier_with_app(app.clone()).await;

    let stale = (chrono::Utc::now().timestamp() - 601).to_string();
    let mut params = BTreeMap::new();
    params.insert("auth_key".to_string(), app.key.clone());
    params.insert("auth_timestamp".to_string(), stale.clone());
    params.insert("auth_version".to_string(), "1.0".to_string());
    let base = AuthVerifier::signing_base_string("GET", "/apps/1/channels", &params);
    let signature = Token::new(app.key.clone(), app.secret.clone()).sign(&base);
    let auth = ApiAuthParams {
        auth_key: app.key.clone(),
        auth_timestamp: stale,
        auth_version: "1.0".to_string(),
        body_md5: String::new(),
        auth_signature: signature,
    };

    let result = verifier
        .verify_api_request("1", "GET", "/apps/1/channels", &auth, &params, None)
        .await;
    let err = result.unwrap_err().to_string();
    assert!(err.contains("Timestamp expired"), "unexpected error: {err}");
}

#[tokio::test]
async fn rejects_wrong_body_md5() {
    let app = test_app();
    let verifier = verifier_with_app(app.clone()).await;
    let body = br#"{"name":"ev"}"#;
    let (auth, params) = signed_params(&app, "POST", "/apps/1/events", Some(body), &[]);

    let result = verifier
        .verify_api_request(
            "1",
            "POST",
            "/apps/1/events",
            &auth,
            &params,
            Some(br#"{"name":"tampered"}"#),
        )
        .await;
    let err = result.unwrap_err().to_string();
    assert!(err.contains("body_md5 mismatch"), "unexpected error: {err}");
}

#[tokio::test]
async fn rejects_body_md5_without_body() {
    let app = test_app();
    let verifier = verifier_with_app(app.clone()).await;
    let (auth, params) = signed_params(
        &app,
        "GET",
        "/apps/1/channels",
        Some(b"phantom"),
        &[],
    );

    let result = verifier
        .verify_api_request("1", "GET", "/apps/1/channels", &auth, &params, None)
        .await;
    let err = result.unwrap_err().to_string();
    assert!(
        err.contains("body_md5 must not be present"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn subscription_signature_round_trip() {
    let app = test_app();
    let verifier = verifier_with_app(app.clone()).await;
    let socket_id = SocketId::parse("1234.5678").unwrap();

    let private_auth =
        AuthVerifier::expected_subscription_signature(&app, &socket_id, "private-room", None);
    verifier
        .verify_channel_subscription(&app, &socket_id, "private-room", None, &private_auth)
        .unwrap();

    let channel_data = r#"{"user_id":"42","user_info":{"name":"a"}}"#;
    let presence_auth = AuthVerifier::expected_subscription_signature(
        &app,
        &socket_id,
        "presence-room",
        Some(channel_data),
    );
    verifier
        .verify_channel_subscription(
            &app,
            &socket_id,
            "presence-room",
            Some(channel_data),
            &presence_auth,
        )
        .unwrap();

    // Swapping the channel data invalidates a presence signature.
    let result = verifier.verify_channel_subscription(
        &app,
        &socket_id,
        "presence-room",
        Some(r#"{"user_id":"13"}"#),
        &presence_auth,
    );
    assert!(result.is_err());

    // A signature for one socket never validates another.
    let other = SocketId::parse("999.999").unwrap();
    let result =
        verifier.verify_channel_subscription(&app, &other, "private-room", None, &private_auth);
    assert!(result.is_err());
}
