use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::member::Member;
use super::registry::{JoinOutcome, RoomRegistry};
use crate::models::ServerEvent;

/// Per-room relay protocol: decides what a newly joined member receives and
/// fans out edit deltas.
///
/// The room's document content is never held server-side. A late joiner is
/// bootstrapped by asking an arbitrary already-synced peer for its current
/// content and relaying the reply; the first member of a room starts from
/// empty content and is authoritative for it.
#[derive(Clone)]
pub struct RoomCoordinator {
    registry: Arc<RoomRegistry>,
    bootstrap_timeout: Duration,
}

impl RoomCoordinator {
    pub fn new(registry: Arc<RoomRegistry>, bootstrap_timeout: Duration) -> Self {
        Self {
            registry,
            bootstrap_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Admit a connection into a room and kick off the bootstrap if the room
    /// already has members.
    pub async fn handle_join(&self, room_id: &str, member: Member) {
        let conn_id = member.conn_id;
        match self.registry.join(room_id, member).await {
            JoinOutcome::AlreadyMember => {
                debug!("Connection {} already in room {}, ignoring join", conn_id, room_id);
            }
            JoinOutcome::InOtherRoom(current) => {
                warn!(
                    "Connection {} tried to join room {} while in room {}; dropping",
                    conn_id, room_id, current
                );
            }
            JoinOutcome::Joined { prior_members: 0 } => {
                // First in: synced with empty content, nothing to fetch.
                debug!(
                    "Connection {} is the first member of room {}, starting from empty content",
                    conn_id, room_id
                );
            }
            JoinOutcome::Joined { .. } => {
                self.request_bootstrap(room_id, conn_id).await;
            }
        }
    }

    /// Ask one synced peer to supply current content for `requester`.
    ///
    /// Which peer answers is unconstrained, and the request may race with
    /// that peer's own disconnect. The joiner is never left blocked: if no
    /// peer can be asked, or no reply arrives within the timeout, it is
    /// marked synced with whatever content it has (empty). No retry.
    async fn request_bootstrap(&self, room_id: &str, requester: Uuid) {
        match self.registry.pick_synced_peer(room_id, requester).await {
            Some(peer) => {
                debug!(
                    "Requesting content for connection {} from peer {} in room {}",
                    requester, peer, room_id
                );
                self.registry
                    .send_to(peer, ServerEvent::RequestCode { requester })
                    .await;

                let registry = Arc::clone(&self.registry);
                let timeout = self.bootstrap_timeout;
                tokio::spawn(async move {
                    sleep(timeout).await;
                    if registry.mark_synced(requester).await {
                        warn!(
                            "Bootstrap for connection {} timed out, proceeding with empty content",
                            requester
                        );
                    }
                });
            }
            None => {
                debug!(
                    "No synced peer available in room {} for connection {}, proceeding with empty content",
                    room_id, requester
                );
                self.registry.mark_synced(requester).await;
            }
        }
    }

    /// Relay a content snapshot from a responding peer to the requester that
    /// asked for it. Only the first response is used; duplicates and late
    /// replies are dropped.
    pub async fn handle_send_code(&self, from: Uuid, requester: Uuid, content: Value) {
        if !self.registry.same_room(from, requester).await {
            warn!(
                "Dropping content snapshot from {}: requester {} is not a peer",
                from, requester
            );
            return;
        }
        if !self.registry.mark_synced(requester).await {
            debug!(
                "Requester {} already synced, ignoring snapshot from {}",
                requester, from
            );
            return;
        }
        self.registry
            .send_to(requester, ServerEvent::ReceiveCode { content })
            .await;
    }

    /// Relay one edit delta to every other member of the sender's room. The
    /// payload is routed untouched and never echoed back to the sender.
    pub async fn handle_code_changes(&self, from: Uuid, delta: Value) {
        if !self
            .registry
            .broadcast_from(from, ServerEvent::CodeChanges { delta })
            .await
        {
            warn!("Dropping delta from {}: not a member of any room", from);
        }
    }

    /// Idempotent removal on disconnect or explicit leave. The registry
    /// notifies the remaining members of the new population; a sole survivor
    /// disables editing client-side on seeing count 1.
    pub async fn handle_disconnect(&self, conn_id: Uuid) {
        if let Some((room_id, remaining)) = self.registry.leave(conn_id).await {
            info!(
                "Connection {} disconnected from room {} ({} members remain)",
                conn_id, room_id, remaining
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn coordinator(timeout: Duration) -> RoomCoordinator {
        RoomCoordinator::new(Arc::new(RoomRegistry::new()), timeout)
    }

    fn member(conn_id: Uuid) -> (Member, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Member::new(conn_id, format!("user-{conn_id}"), tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn full_session_lifecycle() {
        let coordinator = coordinator(Duration::from_secs(30));
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let (member_x, mut rx_x) = member(x);
        let (member_y, mut rx_y) = member(y);

        // X joins an empty room: population 1, no bootstrap.
        coordinator.handle_join("r1", member_x).await;
        assert!(matches!(
            rx_x.try_recv(),
            Ok(ServerEvent::RoomCount { count: 1 })
        ));
        assert!(coordinator.registry().is_synced(x).await);

        // Y joins: everyone sees population 2, X is asked for content.
        coordinator.handle_join("r1", member_y).await;
        assert!(matches!(
            rx_x.try_recv(),
            Ok(ServerEvent::RoomCount { count: 2 })
        ));
        assert!(matches!(
            rx_y.try_recv(),
            Ok(ServerEvent::RoomCount { count: 2 })
        ));
        match rx_x.try_recv() {
            Ok(ServerEvent::RequestCode { requester }) => assert_eq!(requester, y),
            other => panic!("expected a content request at X, got {other:?}"),
        }

        // X answers; the snapshot lands at Y untouched.
        let snapshot = json!({"ops": [{"insert": "let x = 1;"}]});
        coordinator.handle_send_code(x, y, snapshot.clone()).await;
        match rx_y.try_recv() {
            Ok(ServerEvent::ReceiveCode { content }) => assert_eq!(content, snapshot),
            other => panic!("expected bootstrap snapshot at Y, got {other:?}"),
        }
        assert!(coordinator.registry().is_synced(y).await);

        // An edit from X reaches Y but never X itself.
        let delta = json!({"ops": [{"retain": 10}, {"insert": "!"}]});
        coordinator.handle_code_changes(x, delta.clone()).await;
        match rx_y.try_recv() {
            Ok(ServerEvent::CodeChanges { delta: received }) => assert_eq!(received, delta),
            other => panic!("expected relayed delta at Y, got {other:?}"),
        }
        assert!(drain(&mut rx_x).is_empty());

        // Y disconnects: X is alone again.
        coordinator.handle_disconnect(y).await;
        assert!(matches!(
            rx_x.try_recv(),
            Ok(ServerEvent::RoomCount { count: 1 })
        ));
        assert_eq!(coordinator.registry().stats().await, (1, 1));
    }

    #[tokio::test]
    async fn deltas_from_one_sender_arrive_in_emission_order() {
        let coordinator = coordinator(Duration::from_secs(30));
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let (member_x, _rx_x) = member(x);
        let (member_y, mut rx_y) = member(y);

        coordinator.handle_join("r1", member_x).await;
        coordinator.handle_join("r1", member_y).await;
        drain(&mut rx_y);

        for i in 0..5 {
            coordinator.handle_code_changes(x, json!({"seq": i})).await;
        }

        let received: Vec<_> = drain(&mut rx_y)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::CodeChanges { delta } => Some(delta),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = (0..5).map(|i| json!({"seq": i})).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn only_the_first_bootstrap_response_is_used() {
        let coordinator = coordinator(Duration::from_secs(30));
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let z = Uuid::new_v4();
        let (member_x, _rx_x) = member(x);
        let (member_y, _rx_y) = member(y);
        let (member_z, mut rx_z) = member(z);

        coordinator.handle_join("r1", member_x).await;
        coordinator.handle_join("r1", member_y).await;
        coordinator.handle_send_code(x, y, json!("seed")).await;
        coordinator.handle_join("r1", member_z).await;
        drain(&mut rx_z);

        coordinator.handle_send_code(x, z, json!("from x")).await;
        coordinator.handle_send_code(y, z, json!("from y")).await;

        let snapshots: Vec<_> = drain(&mut rx_z)
            .into_iter()
            .filter(|event| matches!(event, ServerEvent::ReceiveCode { .. }))
            .collect();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_for_a_foreign_requester_is_dropped() {
        let coordinator = coordinator(Duration::from_secs(30));
        let x = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let (member_x, _rx_x) = member(x);
        let (member_s, mut rx_s) = member(stranger);

        coordinator.handle_join("r1", member_x).await;
        coordinator.handle_join("other", member_s).await;
        drain(&mut rx_s);

        coordinator.handle_send_code(x, stranger, json!("smuggled")).await;
        assert!(drain(&mut rx_s).is_empty());
    }

    #[tokio::test]
    async fn delta_from_a_roomless_connection_is_dropped() {
        let coordinator = coordinator(Duration::from_secs(30));
        // Never joined anything; must be a logged no-op.
        coordinator
            .handle_code_changes(Uuid::new_v4(), json!({"ops": []}))
            .await;
        assert_eq!(coordinator.registry().stats().await, (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_timeout_unblocks_the_joiner() {
        let coordinator = coordinator(Duration::from_millis(100));
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let (member_x, _rx_x) = member(x);
        let (member_y, _rx_y) = member(y);

        coordinator.handle_join("r1", member_x).await;
        coordinator.handle_join("r1", member_y).await;
        assert!(!coordinator.registry().is_synced(y).await);

        // Nobody answers the content request; the joiner must not stay
        // blocked in the joining state.
        sleep(Duration::from_millis(200)).await;
        assert!(coordinator.registry().is_synced(y).await);
    }

    #[tokio::test]
    async fn responder_disconnecting_mid_bootstrap_is_survivable() {
        let coordinator = coordinator(Duration::from_millis(50));
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let (member_x, _rx_x) = member(x);
        let (member_y, mut rx_y) = member(y);

        coordinator.handle_join("r1", member_x).await;
        coordinator.handle_join("r1", member_y).await;

        // The chosen responder drops before answering.
        coordinator.handle_disconnect(x).await;
        drain(&mut rx_y);

        // A late reply from the departed peer must not reach Y.
        coordinator.handle_send_code(x, y, json!("ghost")).await;
        assert!(drain(&mut rx_y).is_empty());
        assert_eq!(coordinator.registry().members_of("r1").await, vec![y]);
    }

    #[tokio::test]
    async fn simultaneous_joins_to_an_empty_room() {
        let coordinator = coordinator(Duration::from_secs(30));
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        let (member_p, mut rx_p) = member(p);
        let (member_q, mut rx_q) = member(q);

        tokio::join!(
            coordinator.handle_join("r2", member_p),
            coordinator.handle_join("r2", member_q)
        );

        // No member lost, exactly one went through the empty-room path.
        assert_eq!(coordinator.registry().stats().await, (1, 2));
        let synced = [
            coordinator.registry().is_synced(p).await,
            coordinator.registry().is_synced(q).await,
        ];
        assert!(synced.contains(&true));

        // The second joiner either found a synced peer (and got a content
        // request routed to it) or was marked synced directly; answer any
        // outstanding request and check both end up synced.
        for (responder, events) in [(p, drain(&mut rx_p)), (q, drain(&mut rx_q))] {
            for event in events {
                if let ServerEvent::RequestCode { requester } = event {
                    coordinator
                        .handle_send_code(responder, requester, json!("seed"))
                        .await;
                }
            }
        }
        assert!(coordinator.registry().is_synced(p).await);
        assert!(coordinator.registry().is_synced(q).await);
    }
}
