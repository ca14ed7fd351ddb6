use std::panic;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use collab_relay::config::{self, Config};
use collab_relay::ws::coordinator::RoomCoordinator;
use collab_relay::ws::registry::RoomRegistry;
use collab_relay::{build_app, AppState};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "collab_relay=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting relay...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    let config = config::init_config(config);

    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - the relay will admit all connections");
    }

    // The registry is the single shared mutable resource; everything routes
    // through the coordinator that owns it.
    let registry = Arc::new(RoomRegistry::new());
    let coordinator = RoomCoordinator::new(
        registry,
        Duration::from_millis(config.bootstrap_timeout_ms),
    );
    let state = Arc::new(AppState { coordinator });

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Relay running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
