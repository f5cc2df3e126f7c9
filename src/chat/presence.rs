use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::event::{ParticipantKind, ServerEvent};

pub type ConnId = Uuid;

/// Outbound handle for one live socket: the sender side of the connection's
/// delivery queue plus an id to tell reconnects apart. The registry borrows
/// this from the transport layer; it never owns the socket itself.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    id: ConnId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnHandle {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { id: Uuid::now_v7(), tx }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue an event for delivery. Returns false when the receiving task
    /// is gone, i.e. the socket is dead.
    pub fn push(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub identity: String,
    pub kind: ParticipantKind,
    pub conn: ConnHandle,
    pub typing: bool,
}

/// Who is live in which room. Join overwrites any previous entry for the
/// same identity (last write wins), leave is a no-op when absent, and
/// disconnect cleanup matches on the connection id so a stale socket can
/// never evict an identity that already rejoined on a fresh connection.
#[derive(Default)]
pub struct PresenceRegistry {
    rooms: DashMap<String, HashMap<String, Participant>>,
}

impl PresenceRegistry {
    pub fn join(&self, room: &str, identity: &str, kind: ParticipantKind, conn: ConnHandle) {
        self.rooms.entry(room.to_owned()).or_default().insert(
            identity.to_owned(),
            Participant {
                identity: identity.to_owned(),
                kind,
                conn,
                typing: false,
            },
        );
    }

    pub fn leave(&self, room: &str, identity: &str) {
        let Some(mut members) = self.rooms.get_mut(room) else {
            return;
        };
        members.remove(identity);
        let emptied = members.is_empty();
        drop(members);

        if emptied {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    pub fn set_typing(&self, room: &str, identity: &str, is_typing: bool) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            if let Some(participant) = members.get_mut(identity) {
                participant.typing = is_typing;
            }
        }
    }

    /// Snapshot of everyone in the room except the given connection.
    pub fn others(&self, room: &str, except: ConnId) -> Vec<Participant> {
        match self.rooms.get(room) {
            Some(members) => members
                .values()
                .filter(|p| p.conn.id() != except)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Remove one entry, but only while it still belongs to the given
    /// connection. Backs the router's lazy reaping after a failed delivery.
    pub fn prune(&self, room: &str, identity: &str, conn_id: ConnId) {
        let Some(mut members) = self.rooms.get_mut(room) else {
            return;
        };
        if members
            .get(identity)
            .is_some_and(|p| p.conn.id() == conn_id)
        {
            members.remove(identity);
            debug!("reaped stale presence entry for {identity} in {room}");
        }
        let emptied = members.is_empty();
        drop(members);

        if emptied {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    /// Transport-level disconnect: drop every entry owned by this
    /// connection, across all rooms. No-op for never-joined connections.
    pub fn cleanup_by_connection(&self, conn_id: ConnId) {
        let mut emptied = Vec::new();
        for mut room in self.rooms.iter_mut() {
            room.retain(|_, p| p.conn.id() != conn_id);
            if room.is_empty() {
                emptied.push(room.key().clone());
            }
        }

        for room in emptied {
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }

    pub fn participant(&self, room: &str, identity: &str) -> Option<Participant> {
        self.rooms.get(room).and_then(|m| m.get(identity).cloned())
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}
