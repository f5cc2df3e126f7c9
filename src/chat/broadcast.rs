use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::event::{ChatMessage, ParticipantKind, ServerEvent};
use super::history::MessageLog;
use super::presence::{ConnHandle, ConnId, PresenceRegistry};

/// Delivers one sender's event to every other live participant of a room.
/// Messages go through the log before fan-out, and both steps happen under
/// a per-room lock, so every recipient observes the single append order.
/// Typing is relayed without touching the log. Rooms stay independent of
/// each other.
#[derive(Clone)]
pub struct RoomRouter {
    registry: Arc<PresenceRegistry>,
    log: MessageLog,
    order: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl RoomRouter {
    pub fn new(registry: Arc<PresenceRegistry>, log: MessageLog) -> Self {
        Self {
            registry,
            log,
            order: Arc::new(DashMap::new()),
        }
    }

    fn order_lock(&self, room: &str) -> Arc<Mutex<()>> {
        self.order.entry(room.to_owned()).or_default().clone()
    }

    /// Register a joining connection and hand back its one-time history
    /// replay. Runs under the room's append order, so the replay is
    /// complete at the time of the join and nothing arrives twice. A
    /// failed read fails the whole join; nothing is registered.
    pub async fn join(
        &self,
        room: &str,
        identity: &str,
        kind: ParticipantKind,
        conn: ConnHandle,
        replay_limit: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let lock = self.order_lock(room);
        let _guard = lock.lock().await;

        let messages = self.log.recent(room, replay_limit).await?;
        self.registry.join(room, identity, kind, conn);
        Ok(messages)
    }

    pub async fn broadcast_message(
        &self,
        room: &str,
        from: ConnId,
        identity: &str,
        kind: ParticipantKind,
        body: &str,
        timestamp: i64,
    ) -> Result<ChatMessage, sqlx::Error> {
        let lock = self.order_lock(room);
        let _guard = lock.lock().await;

        let message = self.log.append(room, identity, kind, body, timestamp).await?;
        self.fan_out(room, from, ServerEvent::ReceiveMessage(message.clone()));
        Ok(message)
    }

    pub fn broadcast_typing(&self, room: &str, from: ConnId, identity: &str, is_typing: bool) {
        self.registry.set_typing(room, identity, is_typing);
        self.fan_out(
            room,
            from,
            ServerEvent::UserTyping {
                identity: identity.to_owned(),
                is_typing,
            },
        );
    }

    /// Queue the event for everyone in the room except the originating
    /// connection. A dead recipient is reaped lazily and never blocks the
    /// rest of the room.
    fn fan_out(&self, room: &str, from: ConnId, event: ServerEvent) {
        for participant in self.registry.others(room, from) {
            if !participant.conn.push(event.clone()) {
                debug!(
                    "delivery to {} in {room} failed, reaping its presence entry",
                    participant.identity
                );
                self.registry
                    .prune(room, &participant.identity, participant.conn.id());
            }
        }
    }
}
