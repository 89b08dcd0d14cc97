use dashmap::{mapref::entry::Entry, DashMap};
use shared_proto::{
    session::Role,
    signaling::{PeerInfo, ServerEvent},
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub type Tx = mpsc::UnboundedSender<ServerEvent>;

/// Two-party rooms: one user, one therapist.
pub const ROOM_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("room already holds {capacity} participants")]
    RoomFull { capacity: usize },
}

/// One live connection handle inside a room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub connection_id: Uuid,
    pub identity: Uuid,
    pub role: Role,
    pub tx: Tx,
}

impl RoomMember {
    fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            id: self.identity,
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Everyone but the sender.
    Others,
    /// Including the sender; used for chat echo.
    Everyone,
}

#[derive(Debug, Default)]
struct Room {
    members: Vec<RoomMember>,
}

/// Booking id -> live room. Rooms exist only while they have members.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    rooms: DashMap<Uuid, Room>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `member` and returns the resulting room size.
    ///
    /// A second handle for an identity already present replaces the old one.
    /// The replaced connection gets `session-replaced` and no further room
    /// traffic; the other member is re-announced the peer so it can re-offer.
    pub fn join(&self, booking_id: Uuid, member: RoomMember) -> Result<usize, RegistryError> {
        let mut room = match self.rooms.entry(booking_id) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => entry.insert(Room::default()),
        };

        if let Some(existing) = room
            .members
            .iter_mut()
            .find(|m| m.identity == member.identity)
        {
            tracing::info!(
                component = "registry.join",
                booking_id = %booking_id,
                identity = %member.identity,
                replaced_connection = %existing.connection_id,
                "replacing stale handle for reconnecting identity"
            );
            if existing.connection_id != member.connection_id {
                let _ = existing.tx.send(ServerEvent::SessionReplaced { booking_id });
            }
            *existing = member.clone();
            // the remaining member may have missed the old socket's drop; let it re-offer
            announce_join(&room.members, booking_id, &member);
            return Ok(room.members.len());
        }

        if room.members.len() >= ROOM_CAPACITY {
            return Err(RegistryError::RoomFull {
                capacity: ROOM_CAPACITY,
            });
        }

        announce_join(&room.members, booking_id, &member);
        room.members.push(member);
        Ok(room.members.len())
    }

    /// Removes the handle owned by `connection_id`. Absent rooms and
    /// unknown connections are no-ops.
    pub fn leave(&self, booking_id: Uuid, connection_id: Uuid) -> bool {
        let removed = {
            let Some(mut room) = self.rooms.get_mut(&booking_id) else {
                return false;
            };
            let Some(index) = room
                .members
                .iter()
                .position(|m| m.connection_id == connection_id)
            else {
                return false;
            };
            let removed = room.members.remove(index);

            let notice = ServerEvent::PeerLeft {
                booking_id,
                peer_id: removed.identity,
            };
            for other in &room.members {
                let _ = other.tx.send(notice.clone());
            }
            removed
        };

        // guard above must be released before remove_if takes the shard lock
        if self
            .rooms
            .remove_if(&booking_id, |_, room| room.members.is_empty())
            .is_some()
        {
            tracing::debug!(component = "registry.leave", booking_id = %booking_id, "room closed");
        }

        tracing::debug!(
            component = "registry.leave",
            booking_id = %booking_id,
            identity = %removed.identity,
            "member left room"
        );
        true
    }

    /// Returns how many members the event was queued for.
    ///
    /// Holds the room's write guard while queueing, so concurrent senders are
    /// serialized and every member sees the same per-room order.
    pub fn broadcast_to_room(
        &self,
        booking_id: Uuid,
        sender_connection: Uuid,
        event: &ServerEvent,
        delivery: Delivery,
    ) -> usize {
        let Some(room) = self.rooms.get_mut(&booking_id) else {
            return 0;
        };

        room.members
            .iter()
            .filter(|m| delivery == Delivery::Everyone || m.connection_id != sender_connection)
            .filter(|m| m.tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn room_size(&self, booking_id: Uuid) -> usize {
        self.rooms
            .get(&booking_id)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    pub fn is_member(&self, booking_id: Uuid, connection_id: Uuid) -> bool {
        self.rooms
            .get(&booking_id)
            .is_some_and(|room| room.members.iter().any(|m| m.connection_id == connection_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn members(&self, booking_id: Uuid) -> Vec<PeerInfo> {
        self.rooms
            .get(&booking_id)
            .map(|room| room.members.iter().map(RoomMember::peer_info).collect())
            .unwrap_or_default()
    }
}

/// Tells everyone already in the room (other than `member` itself) that it joined.
fn announce_join(members: &[RoomMember], booking_id: Uuid, member: &RoomMember) {
    let notice = ServerEvent::PeerJoined {
        booking_id,
        peer: member.peer_info(),
    };
    for other in members
        .iter()
        .filter(|m| m.connection_id != member.connection_id)
    {
        let _ = other.tx.send(notice.clone());
    }
}
