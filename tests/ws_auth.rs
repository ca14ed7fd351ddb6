//! Handshake admission tests. Runs in its own process because the JWT
//! secret is installed in the process-wide config.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Error};

use collab_relay::clients::CollabClient;
use collab_relay::config::{self, Config};
use collab_relay::editor::EditorWidget;
use collab_relay::models::ServerEvent;
use collab_relay::ws::coordinator::RoomCoordinator;
use collab_relay::ws::registry::RoomRegistry;
use collab_relay::{build_app, AppState};

const SECRET: &str = "test-secret";

#[derive(Default)]
struct NullWidget;

impl EditorWidget for NullWidget {
    fn contents(&self) -> Value {
        Value::Null
    }
    fn set_contents(&mut self, _content: Value) {}
    fn apply_delta(&mut self, _delta: &Value) {}
    fn enable(&mut self) {}
    fn disable(&mut self) {}
}

async fn spawn_guarded_relay() -> String {
    config::init_config(Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    });

    let registry = Arc::new(RoomRegistry::new());
    let coordinator = RoomCoordinator::new(registry, Duration::from_secs(5));
    let state = Arc::new(AppState { coordinator });
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

fn token_for(sub: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    let claims = json!({"sub": sub, "exp": exp});
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn unauthorized_connections_never_reach_a_room() {
    let url = spawn_guarded_relay().await;

    // No token: the upgrade is refused outright.
    match connect_async(url.as_str()).await {
        Err(Error::Http(response)) => assert_eq!(response.status(), 401),
        other => panic!("expected a 401 refusal, got {other:?}"),
    }

    // Garbage token: same refusal.
    let bad = format!("{}?token=not-a-jwt", url);
    assert!(matches!(
        connect_async(bad.as_str()).await,
        Err(Error::Http(_))
    ));

    // Valid token: admitted, and the room machinery works as usual.
    let mut client = CollabClient::connect(&url, Some(&token_for("user-1")), NullWidget)
        .await
        .unwrap();
    client.join("session-1").await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), client.recv_event())
        .await
        .expect("timed out waiting for the population signal")
        .expect("connection closed unexpectedly");
    assert!(matches!(event, ServerEvent::RoomCount { count: 1 }));
}
