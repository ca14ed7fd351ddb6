use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Events a client may send to the relay.
///
/// Delta and content payloads are opaque to the relay: they are produced and
/// consumed by the embedded editing widget and routed byte-for-byte.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Request membership in a room.
    #[serde(rename = "join-room")]
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Reply to a `request code`, carrying the full content snapshot for the
    /// named requester.
    #[serde(rename = "send code")]
    SendCode { requester: Uuid, content: Value },
    /// One local edit.
    #[serde(rename = "client code changes")]
    CodeChanges { delta: Value },
    #[serde(rename = "ping")]
    Ping,
}

/// Events the relay sends to a client.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Current population of the recipient's room; sent to all members on
    /// every join and leave.
    #[serde(rename = "room count")]
    RoomCount { count: usize },
    /// Ask the recipient to supply its current content for `requester`.
    #[serde(rename = "request code")]
    RequestCode { requester: Uuid },
    /// Bootstrap snapshot for a newly joined connection.
    #[serde(rename = "receive code")]
    ReceiveCode { content: Value },
    /// Relay of another member's edit.
    #[serde(rename = "server code changes")]
    CodeChanges { delta: Value },
    #[serde(rename = "pong")]
    Pong { date: String },
}
