use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::member::Member;
use crate::models::ServerEvent;

/// Outcome of a join attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection is already a member of that room; nothing changed.
    AlreadyMember,
    /// The connection is currently a member of a different room; nothing
    /// changed. A connection belongs to at most one room at a time.
    InOtherRoom(String),
    /// The connection was added. `prior_members` counts the members present
    /// before this join.
    Joined { prior_members: usize },
}

#[derive(Default)]
struct RegistryInner {
    rooms: HashMap<String, HashMap<Uuid, Member>>,
    conn_rooms: HashMap<Uuid, String>,
}

/// Process-wide table mapping room id to its member connections.
///
/// All mutation goes through `join`/`leave`, and a room exists in the table
/// iff it has at least one member. A single mutex guards the whole table, so
/// join/leave (including their population broadcasts) are atomic with respect
/// to each other; two simultaneous joins to the same room cannot lose a
/// member.
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Add a connection to a room, creating the room entry if absent.
    ///
    /// The first member of a room is marked synced on the spot: it starts
    /// from empty content and is the authoritative source for later peers.
    /// Broadcasts the new population to every member, including the joiner.
    pub async fn join(&self, room_id: &str, mut member: Member) -> JoinOutcome {
        let mut inner = self.inner.lock().await;

        if let Some(current) = inner.conn_rooms.get(&member.conn_id) {
            if current == room_id {
                return JoinOutcome::AlreadyMember;
            }
            return JoinOutcome::InOtherRoom(current.clone());
        }

        let conn_id = member.conn_id;
        let room = inner.rooms.entry(room_id.to_string()).or_default();
        let prior_members = room.len();
        if prior_members == 0 {
            member.synced = true;
        }
        room.insert(conn_id, member);
        inner.conn_rooms.insert(conn_id, room_id.to_string());

        info!(
            "Connection {} joined room {} ({} members)",
            conn_id,
            room_id,
            prior_members + 1
        );
        Self::broadcast_count(&inner, room_id);
        JoinOutcome::Joined { prior_members }
    }

    /// Remove a connection from whichever room it belongs to.
    ///
    /// Deletes the room entry when it empties (no ghost rooms) and broadcasts
    /// the new population to the remaining members. Leaving when not a member
    /// of any room is a no-op. Returns the room left and how many members
    /// remain in it.
    pub async fn leave(&self, conn_id: Uuid) -> Option<(String, usize)> {
        let mut inner = self.inner.lock().await;

        let room_id = inner.conn_rooms.remove(&conn_id)?;
        let remaining = match inner.rooms.get_mut(&room_id) {
            Some(room) => {
                room.remove(&conn_id);
                room.len()
            }
            None => return None,
        };

        if remaining == 0 {
            inner.rooms.remove(&room_id);
            info!("Connection {} left room {}; room is empty, evicting", conn_id, room_id);
        } else {
            info!(
                "Connection {} left room {} ({} members remain)",
                conn_id, room_id, remaining
            );
            Self::broadcast_count(&inner, &room_id);
        }
        Some((room_id, remaining))
    }

    /// Snapshot of a room's member connection ids; empty when the room is
    /// absent.
    pub async fn members_of(&self, room_id: &str) -> Vec<Uuid> {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(room_id)
            .map(|room| room.keys().copied().collect())
            .unwrap_or_default()
    }

    /// The room a connection currently belongs to, if any.
    pub async fn room_of(&self, conn_id: Uuid) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.conn_rooms.get(&conn_id).cloned()
    }

    /// Whether two connections are members of the same room.
    pub async fn same_room(&self, a: Uuid, b: Uuid) -> bool {
        let inner = self.inner.lock().await;
        match (inner.conn_rooms.get(&a), inner.conn_rooms.get(&b)) {
            (Some(room_a), Some(room_b)) => room_a == room_b,
            _ => false,
        }
    }

    /// Unicast an event to one connection. Returns false when the connection
    /// is not in any room.
    pub async fn send_to(&self, conn_id: Uuid, event: ServerEvent) -> bool {
        let inner = self.inner.lock().await;
        match Self::member(&inner, conn_id) {
            Some(member) => {
                member.send(event);
                true
            }
            None => false,
        }
    }

    /// Fan an event out to every member of the sender's room except the
    /// sender itself. Returns false when the sender is not in any room.
    pub async fn broadcast_from(&self, conn_id: Uuid, event: ServerEvent) -> bool {
        let inner = self.inner.lock().await;
        let Some(room_id) = inner.conn_rooms.get(&conn_id) else {
            return false;
        };
        let Some(room) = inner.rooms.get(room_id) else {
            return false;
        };
        for member in room.values().filter(|m| m.conn_id != conn_id) {
            member.send(event.clone());
        }
        true
    }

    /// Pick some synced member of a room other than `exclude`.
    ///
    /// Which member is picked is deliberately unspecified (map iteration
    /// order); callers must not depend on the choice.
    pub async fn pick_synced_peer(&self, room_id: &str, exclude: Uuid) -> Option<Uuid> {
        let inner = self.inner.lock().await;
        inner.rooms.get(room_id).and_then(|room| {
            room.values()
                .find(|m| m.synced && m.conn_id != exclude)
                .map(|m| m.conn_id)
        })
    }

    /// Mark a connection as having received initial content. Idempotent;
    /// returns whether the flag actually transitioned, so callers can enforce
    /// that exactly one bootstrap response is used.
    pub async fn mark_synced(&self, conn_id: Uuid) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(room_id) = inner.conn_rooms.get(&conn_id).cloned() else {
            return false;
        };
        let Some(member) = inner
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.get_mut(&conn_id))
        else {
            return false;
        };
        if member.synced {
            return false;
        }
        member.synced = true;
        true
    }

    pub async fn is_synced(&self, conn_id: Uuid) -> bool {
        let inner = self.inner.lock().await;
        Self::member(&inner, conn_id).map(|m| m.synced).unwrap_or(false)
    }

    /// Room and connection counts, for diagnostics.
    pub async fn stats(&self) -> (u32, u32) {
        let inner = self.inner.lock().await;
        (inner.rooms.len() as u32, inner.conn_rooms.len() as u32)
    }

    fn member(inner: &RegistryInner, conn_id: Uuid) -> Option<&Member> {
        let room_id = inner.conn_rooms.get(&conn_id)?;
        inner.rooms.get(room_id)?.get(&conn_id)
    }

    fn broadcast_count(inner: &RegistryInner, room_id: &str) {
        if let Some(room) = inner.rooms.get(room_id) {
            let count = room.len();
            for member in room.values() {
                member.send(ServerEvent::RoomCount { count });
            }
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
