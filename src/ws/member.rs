use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::ServerEvent;

/// One live connection as seen by the room registry.
///
/// The `sender` is the connection's single ordered outbound channel; the
/// socket task on the other end serializes events onto the wire in queue
/// order, which is what gives per-connection delivery ordering.
#[derive(Debug, Clone)]
pub struct Member {
    pub conn_id: Uuid,
    /// Opaque authenticated identity reference, supplied at handshake.
    pub user: String,
    pub sender: UnboundedSender<ServerEvent>,
    /// Whether this connection has received initial content, or was the
    /// first member of its room and is authoritative for it.
    pub synced: bool,
}

impl Member {
    pub fn new(conn_id: Uuid, user: String, sender: UnboundedSender<ServerEvent>) -> Self {
        Self {
            conn_id,
            user,
            sender,
            synced: false,
        }
    }

    /// Queue an event for delivery. A send failure means the socket task is
    /// gone; the event is silently dropped.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
