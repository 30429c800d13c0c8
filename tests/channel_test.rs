use driftwave::app::auth::AuthVerifier;
use driftwave::app::config::App;
use driftwave::app::memory_registry::MemoryAppRegistry;
use driftwave::app::registry::AppRegistry;
use driftwave::channel::manager::ChannelManager;
use driftwave::gateway::{ConnectionGateway, ConnectionHandle, SocketId};
use driftwave::protocol::messages::{MessageData, PusherMessage};
use driftwave::store::memory::MemoryStateStore;
use driftwave::store::SharedStateStore;
use driftwave::sync::local::LocalSyncAdapter;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Harness {
    app: App,
    gateway: Arc<ConnectionGateway>,
    store: Arc<MemoryStateStore>,
    manager: ChannelManager,
}

async fn harness() -> Harness {
    let app = App {
        id: "1".to_string(),
        key: "test-key".to_string(),
        secret: "test-secret".to_string(),
        ..Default::default()
    };
    let registry = Arc::new(MemoryAppRegistry::new());
    registry.register_app(app.clone()).await.unwrap();

    let gateway = Arc::new(ConnectionGateway::new());
    let store = Arc::new(MemoryStateStore::new());
    let sync = Arc::new(LocalSyncAdapter::new(gateway.clone()));
    let verifier = Arc::new(AuthVerifier::new(registry));
    let manager = ChannelManager::new(gateway.clone(), store.clone(), sync, verifier);

    Harness {
        app,
        gateway,
        store,
        manager,
    }
}

fn connect(h: &Harness) -> (Arc<ConnectionHandle>, mpsc::UnboundedReceiver<PusherMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = Arc::new(ConnectionHandle::new(
        SocketId::new(),
        h.app.id.clone(),
        tx,
    ));
    h.gateway.namespace(&h.app.id).add_socket(handle.clone());
    (handle, rx)
}

fn presence_auth(h: &Harness, handle: &ConnectionHandle, channel: &str, data: &str) -> String {
    AuthVerifier::expected_subscription_signature(&h.app, &handle.socket_id, channel, Some(data))
}

#[tokio::test]
async fn public_channel_needs_no_auth() {
    let h = harness().await;
    let (handle, _rx) = connect(&h);

    let succeeded = h
        .manager
        .subscribe(&h.app, &handle, "orders", None, None)
        .await
        .unwrap();
    assert_eq!(
        succeeded.event.as_deref(),
        Some("pusher_internal:subscription_succeeded")
    );
    assert_eq!(h.gateway.namespace("1").channel_socket_count("orders"), 1);
}

#[tokio::test]
async fn private_channel_rejects_missing_or_bad_auth() {
    let h = harness().await;
    let (handle, _rx) = connect(&h);

    assert!(h
        .manager
        .subscribe(&h.app, &handle, "private-orders", None, None)
        .await
        .is_err());
    assert!(h
        .manager
        .subscribe(&h.app, &handle, "private-orders", Some("test-key:forged"), None)
        .await
        .is_err());
    assert_eq!(
        h.gateway.namespace("1").channel_socket_count("private-orders"),
        0
    );
}

#[tokio::test]
async fn private_channel_accepts_valid_signature() {
    let h = harness().await;
    let (handle, _rx) = connect(&h);

    let auth = AuthVerifier::expected_subscription_signature(
        &h.app,
        &handle.socket_id,
        "private-orders",
        None,
    );
    h.manager
        .subscribe(&h.app, &handle, "private-orders", Some(&auth), None)
        .await
        .unwrap();
    let namespace = h.gateway.namespace("1");
    assert_eq!(namespace.channel_socket_count("private-orders"), 1);
    assert!(namespace.is_in_channel("private-orders", &handle.socket_id));
}

#[tokio::test]
async fn repeated_subscribe_has_no_extra_effect() {
    let h = harness().await;
    let (handle, _rx) = connect(&h);

    for _ in 0..3 {
        h.manager
            .subscribe(&h.app, &handle, "orders", None, None)
            .await
            .unwrap();
    }
    assert_eq!(h.gateway.namespace("1").channel_socket_count("orders"), 1);
}

#[tokio::test]
async fn presence_subscribe_announces_member_once_per_user() {
    let h = harness().await;
    let (observer, mut observer_rx) = connect(&h);
    let data = r#"{"user_id":"9","user_info":{"name":"o"}}"#;
    let auth = presence_auth(&h, &observer, "presence-chat", data);
    h.manager
        .subscribe(&h.app, &observer, "presence-chat", Some(&auth), Some(data))
        .await
        .unwrap();

    // User 42 joins on two devices.
    let data_42 = r#"{"user_id":"42","user_info":{"name":"a"}}"#;
    let (first, _rx1) = connect(&h);
    let auth = presence_auth(&h, &first, "presence-chat", data_42);
    let succeeded = h
        .manager
        .subscribe(&h.app, &first, "presence-chat", Some(&auth), Some(data_42))
        .await
        .unwrap();

    // Roster in the succeeded frame covers both users.
    let payload = match succeeded.data {
        Some(MessageData::String(s)) => serde_json::from_str::<serde_json::Value>(&s).unwrap(),
        other => panic!("unexpected payload: {other:?}"),
    };
    assert_eq!(payload["presence"]["count"], 2);

    let (second, _rx2) = connect(&h);
    let auth = presence_auth(&h, &second, "presence-chat", data_42);
    h.manager
        .subscribe(&h.app, &second, "presence-chat", Some(&auth), Some(data_42))
        .await
        .unwrap();

    // The observer saw exactly one member_added for user 42.
    let mut member_added = 0;
    while let Ok(message) = observer_rx.try_recv() {
        if message.event.as_deref() == Some("pusher_internal:member_added") {
            member_added += 1;
        }
    }
    assert_eq!(member_added, 1);
}

#[tokio::test]
async fn member_removed_fires_only_on_last_connection() {
    let h = harness().await;
    let (observer, mut observer_rx) = connect(&h);
    let data = r#"{"user_id":"9"}"#;
    let auth = presence_auth(&h, &observer, "presence-chat", data);
    h.manager
        .subscribe(&h.app, &observer, "presence-chat", Some(&auth), Some(data))
        .await
        .unwrap();

    let data_42 = r#"{"user_id":"42"}"#;
    let (first, _rx1) = connect(&h);
    let auth = presence_auth(&h, &first, "presence-chat", data_42);
    h.manager
        .subscribe(&h.app, &first, "presence-chat", Some(&auth), Some(data_42))
        .await
        .unwrap();
    let (second, _rx2) = connect(&h);
    let auth = presence_auth(&h, &second, "presence-chat", data_42);
    h.manager
        .subscribe(&h.app, &second, "presence-chat", Some(&auth), Some(data_42))
        .await
        .unwrap();
    while observer_rx.try_recv().is_ok() {}

    h.manager
        .unsubscribe(&h.app.id, &first, "presence-chat")
        .await
        .unwrap();
    assert!(observer_rx.try_recv().is_err(), "removal announced too early");

    h.manager
        .unsubscribe(&h.app.id, &second, "presence-chat")
        .await
        .unwrap();
    let message = observer_rx.try_recv().expect("member_removed expected");
    assert_eq!(
        message.event.as_deref(),
        Some("pusher_internal:member_removed")
    );
}

#[tokio::test]
async fn unsubscribe_of_unknown_channel_is_a_noop() {
    let h = harness().await;
    let (handle, _rx) = connect(&h);

    h.manager
        .unsubscribe(&h.app.id, &handle, "never-joined")
        .await
        .unwrap();
    // And twice for a channel that was joined.
    h.manager
        .subscribe(&h.app, &handle, "orders", None, None)
        .await
        .unwrap();
    h.manager
        .unsubscribe(&h.app.id, &handle, "orders")
        .await
        .unwrap();
    h.manager
        .unsubscribe(&h.app.id, &handle, "orders")
        .await
        .unwrap();
}

#[tokio::test]
async fn disconnect_cleans_every_membership() {
    let h = harness().await;
    let (observer, mut observer_rx) = connect(&h);
    let data = r#"{"user_id":"9"}"#;
    let auth = presence_auth(&h, &observer, "presence-chat", data);
    h.manager
        .subscribe(&h.app, &observer, "presence-chat", Some(&auth), Some(data))
        .await
        .unwrap();

    let (handle, _rx) = connect(&h);
    h.manager
        .subscribe(&h.app, &handle, "orders", None, None)
        .await
        .unwrap();
    let data_42 = r#"{"user_id":"42"}"#;
    let auth = presence_auth(&h, &handle, "presence-chat", data_42);
    h.manager
        .subscribe(&h.app, &handle, "presence-chat", Some(&auth), Some(data_42))
        .await
        .unwrap();
    while observer_rx.try_recv().is_ok() {}

    h.manager.handle_disconnect(&h.app.id, &handle).await;

    let namespace = h.gateway.namespace("1");
    assert_eq!(namespace.channel_socket_count("orders"), 0);
    assert_eq!(namespace.channel_socket_count("presence-chat"), 1);
    assert!(!namespace.is_in_channel("presence-chat", &handle.socket_id));
    assert!(namespace.get_socket(&handle.socket_id).is_none());

    let message = observer_rx.try_recv().expect("member_removed expected");
    assert_eq!(
        message.event.as_deref(),
        Some("pusher_internal:member_removed")
    );
}

#[tokio::test]
async fn disconnect_clears_presence_after_dead_socket_eviction() {
    let h = harness().await;
    let (observer, mut observer_rx) = connect(&h);
    let data = r#"{"user_id":"9"}"#;
    let auth = presence_auth(&h, &observer, "presence-chat", data);
    h.manager
        .subscribe(&h.app, &observer, "presence-chat", Some(&auth), Some(data))
        .await
        .unwrap();

    let data_42 = r#"{"user_id":"42"}"#;
    let (handle, rx) = connect(&h);
    let auth = presence_auth(&h, &handle, "presence-chat", data_42);
    h.manager
        .subscribe(&h.app, &handle, "presence-chat", Some(&auth), Some(data_42))
        .await
        .unwrap();
    while observer_rx.try_recv().is_ok() {}

    // Kill the socket, then broadcast: the namespace evicts the dead socket
    // from the channel on its own, before the disconnect path runs.
    drop(rx);
    let namespace = h.gateway.namespace("1");
    namespace.broadcast_to_channel(
        "presence-chat",
        &PusherMessage::channel_event("nudge", "presence-chat", serde_json::Value::Null),
        None,
    );
    assert_eq!(namespace.channel_socket_count("presence-chat"), 1);

    h.manager.handle_disconnect(&h.app.id, &handle).await;

    assert_eq!(
        h.store.presence_user_count(&h.app.id, "presence-chat").await.unwrap(),
        1,
        "evicted socket left a stranded roster entry"
    );
    while let Ok(message) = observer_rx.try_recv() {
        if message.event.as_deref() == Some("pusher_internal:member_removed") {
            return;
        }
    }
    panic!("member_removed expected after disconnect");
}

#[tokio::test]
async fn invalid_channel_names_are_rejected() {
    let h = harness().await;
    let (handle, _rx) = connect(&h);

    assert!(h
        .manager
        .subscribe(&h.app, &handle, "bad channel!", None, None)
        .await
        .is_err());
    assert!(h
        .manager
        .subscribe(&h.app, &handle, "", None, None)
        .await
        .is_err());
}
