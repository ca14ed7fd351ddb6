use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{ClientEvent, ServerEvent};
use crate::services::auth_service;
use crate::ws::member::Member;
use crate::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket handler
///
/// Admission is decided before the upgrade: unauthorized connections are
/// refused with 401 and never reach the room registry.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    let user = match auth_service::authorize_connection(&headers, query.token.as_deref()) {
        Ok(user) => user,
        Err(e) => {
            warn!("Rejecting unauthorized WebSocket connection: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, user: String, state: Arc<AppState>) {
    // Generate unique connection ID to identify this client
    let conn_id = Uuid::new_v4();
    info!(
        "WebSocket connection established: conn_id={} user={}",
        conn_id, user
    );

    // Split the socket into sender and receiver
    let (mut sink, mut stream) = socket.split();

    // Single ordered outbound channel for this connection; everything the
    // registry queues here reaches the wire in queue order.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Pump queued server events onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize event for {}: {}", conn_id, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Read incoming frames and dispatch them to the coordinator
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(Message::Text(msg))) = stream.next().await {
            // Parse the incoming frame; a malformed frame is dropped, it
            // must not affect this or any other connection
            let event: ClientEvent = match serde_json::from_str(&msg) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Dropping unparseable frame from {}: {}", conn_id, e);
                    continue;
                }
            };

            match event {
                ClientEvent::JoinRoom { room_id } => {
                    let member = Member::new(conn_id, user.clone(), tx.clone());
                    recv_state.coordinator.handle_join(&room_id, member).await;
                }
                ClientEvent::SendCode { requester, content } => {
                    recv_state
                        .coordinator
                        .handle_send_code(conn_id, requester, content)
                        .await;
                }
                ClientEvent::CodeChanges { delta } => {
                    recv_state
                        .coordinator
                        .handle_code_changes(conn_id, delta)
                        .await;
                }
                ClientEvent::Ping => {
                    let _ = tx.send(ServerEvent::Pong {
                        date: Utc::now().to_rfc3339(),
                    });
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // Idempotent removal; sends racing against this teardown are dropped
    // silently by the registry.
    state.coordinator.handle_disconnect(conn_id).await;
    info!("WebSocket connection terminated: {}", conn_id);
}
