//! Room registry and broadcast engine.
//!
//! The [`Hub`] maps room keys to their member connections. Rooms exist only
//! while they have members: the first join creates the entry and the last
//! leave removes it. Broadcasting performs one non-blocking enqueue per member
//! and, when a relay transport is configured, republishes the message so the
//! hubs of other server processes deliver it to their own members.

pub mod batch;
pub mod connection;
pub mod fanout;
pub mod outbound;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use roomcast_shared::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub use batch::{BatchConfig, Batcher};
pub use connection::{Connection, DeliveryConfig};
pub use fanout::spawn_relay_subscriber;
pub use outbound::{Enqueue, Outbound, OutboundQueue};

use crate::{
    domain::{ConnectionId, NodeId, NodeIdFactory, Relay, RelayDelivery, RelayError, RoomId},
    infrastructure::relay::NoopRelay,
};

/// Prefix of the relay topic carrying a room's broadcasts.
pub const ROOM_TOPIC_PREFIX: &str = "room:";
/// Subscription pattern covering every room topic.
pub const ROOM_TOPIC_PATTERN: &str = "room:*";

pub fn room_topic(room: &RoomId) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room}")
}

/// What travels over the relay for one broadcast.
#[derive(Debug, Serialize, Deserialize)]
struct RelayFrame {
    origin: NodeId,
    room: RoomId,
    message: Message,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<RoomId, HashMap<ConnectionId, Arc<Connection>>>,
    /// Reverse index so a closing connection can leave every room at once.
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl Rooms {
    fn remove(&mut self, room: &RoomId, conn_id: ConnectionId) -> bool {
        let Some(members) = self.members.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&conn_id).is_some();
        if members.is_empty() {
            self.members.remove(room);
        }
        if let Some(rooms) = self.memberships.get_mut(&conn_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.memberships.remove(&conn_id);
            }
        }
        removed
    }
}

/// Registry of rooms and their member connections.
pub struct Hub {
    rooms: RwLock<Rooms>,
    relay: Arc<dyn Relay>,
    node_id: NodeId,
}

impl Hub {
    pub fn new(relay: Arc<dyn Relay>) -> Self {
        Self {
            rooms: RwLock::new(Rooms::default()),
            relay,
            node_id: NodeIdFactory::generate(),
        }
    }

    /// A hub for a single-process deployment.
    pub fn local() -> Self {
        Self::new(Arc::new(NoopRelay))
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn relay(&self) -> &Arc<dyn Relay> {
        &self.relay
    }

    /// Add `conn` to `room`, creating the room if needed. Returns `false` if
    /// it was already a member.
    pub async fn join(&self, room: &RoomId, conn: &Arc<Connection>) -> bool {
        let mut rooms = self.rooms.write().await;
        let inserted = rooms
            .members
            .entry(room.clone())
            .or_default()
            .insert(conn.id(), conn.clone())
            .is_none();
        rooms
            .memberships
            .entry(conn.id())
            .or_default()
            .insert(room.clone());
        if inserted {
            tracing::debug!(conn_id = %conn.id(), room = %room, "joined room");
        }
        inserted
    }

    /// Remove `conn_id` from `room`; the room disappears with its last
    /// member. Leaving a room one is not in is a no-op returning `false`.
    pub async fn leave(&self, room: &RoomId, conn_id: ConnectionId) -> bool {
        let removed = self.rooms.write().await.remove(room, conn_id);
        if removed {
            tracing::debug!(conn_id = %conn_id, room = %room, "left room");
        }
        removed
    }

    /// Remove `conn_id` from every room it is in. Returns the rooms left.
    pub async fn leave_all(&self, conn_id: ConnectionId) -> Vec<RoomId> {
        let mut rooms = self.rooms.write().await;
        let Some(joined) = rooms.memberships.remove(&conn_id) else {
            return Vec::new();
        };
        for room in &joined {
            rooms.remove(room, conn_id);
        }
        joined.into_iter().collect()
    }

    pub async fn is_member(&self, room: &RoomId, conn_id: ConnectionId) -> bool {
        self.rooms
            .read()
            .await
            .members
            .get(room)
            .is_some_and(|members| members.contains_key(&conn_id))
    }

    /// Deliver `message` to every member of `room` and publish it to the
    /// relay. Returns the number of local members it was enqueued for.
    pub async fn broadcast(&self, room: &RoomId, message: Message) -> usize {
        let message = Arc::new(message);
        let delivered = self.broadcast_local(room, &message, None).await;
        self.publish(room, &message).await;
        delivered
    }

    /// Like [`Hub::broadcast`] but skips `exclude` locally.
    ///
    /// Other processes have no notion of the excluded connection and deliver
    /// to all of their members.
    pub async fn broadcast_except(
        &self,
        room: &RoomId,
        message: Message,
        exclude: ConnectionId,
    ) -> usize {
        let message = Arc::new(message);
        let delivered = self.broadcast_local(room, &message, Some(exclude)).await;
        self.publish(room, &message).await;
        delivered
    }

    /// Deliver to local members only, without touching the relay.
    pub async fn broadcast_local(
        &self,
        room: &RoomId,
        message: &Outbound,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.members.get(room) else {
            return 0;
        };
        let mut delivered = 0;
        for (id, conn) in members {
            if Some(*id) == exclude {
                continue;
            }
            if conn.deliver(message) == Enqueue::Queued {
                delivered += 1;
            }
        }
        tracing::debug!(room = %room, kind = %message.kind, delivered, "broadcast");
        delivered
    }

    async fn publish(&self, room: &RoomId, message: &Message) {
        if !self.relay.is_enabled() {
            return;
        }
        let frame = RelayFrame {
            origin: self.node_id.clone(),
            room: room.clone(),
            message: message.clone(),
        };
        let result = match serde_json::to_string(&frame) {
            Ok(payload) => self.relay.publish(&room_topic(room), payload).await,
            Err(e) => Err(RelayError::Codec(e)),
        };
        if let Err(e) = result {
            tracing::warn!(room = %room, error = %e, "relay publish failed; delivered locally only");
        }
    }

    /// Re-inject a broadcast received from the relay. Frames published by
    /// this hub are ignored. Returns the number of local deliveries.
    pub async fn accept_relayed(&self, delivery: &RelayDelivery) -> Result<usize, RelayError> {
        let frame: RelayFrame = serde_json::from_str(&delivery.payload)?;
        if frame.origin == self.node_id {
            return Ok(0);
        }
        let message = Arc::new(frame.message);
        Ok(self.broadcast_local(&frame.room, &message, None).await)
    }

    pub async fn member_count(&self, room: &RoomId) -> usize {
        self.rooms
            .read()
            .await
            .members
            .get(room)
            .map_or(0, HashMap::len)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.members.len()
    }

    /// Snapshot of every room and its member count, sorted by room key.
    pub async fn rooms(&self) -> Vec<(RoomId, usize)> {
        let rooms = self.rooms.read().await;
        let mut snapshot: Vec<(RoomId, usize)> = rooms
            .members
            .iter()
            .map(|(room, members)| (room.clone(), members.len()))
            .collect();
        snapshot.sort();
        snapshot
    }
}
