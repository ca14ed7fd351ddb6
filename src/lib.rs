pub mod clients;
pub mod config;
pub mod docs;
pub mod editor;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod ws;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use docs::ApiDoc;
use routes::api::create_api_routes;
use ws::coordinator::RoomCoordinator;

/// Shared application state: the coordinator owns the room registry, which
/// is the only shared mutable resource in the relay.
pub struct AppState {
    pub coordinator: RoomCoordinator,
}

/// Assemble the full application router: REST API, WebSocket endpoint and
/// Swagger UI.
pub fn build_app(state: Arc<AppState>) -> Router {
    let ws_routes = Router::new()
        .route("/ws", get(ws::handler::websocket_handler))
        .with_state(state.clone());

    Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(state))
        // Mount the WebSocket endpoint
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}
