mod broadcast;
pub mod event;
pub mod history;
mod presence;
mod ws;

use std::sync::Arc;

use axum::{routing::get, Router};
use sqlx::SqlitePool;

use crate::AppState;

pub use broadcast::RoomRouter;
pub use event::{ChatMessage, ParticipantKind};
pub use presence::{ConnHandle, ConnId, Participant, PresenceRegistry};

pub const DEFAULT_HISTORY_LIMIT: i64 = 200;

/// Everything the realtime layer shares across connections: the live
/// presence registry, the persisted message log, and the router fanning
/// events out between them.
#[derive(Clone)]
pub struct Chat {
    pub registry: Arc<PresenceRegistry>,
    pub router: RoomRouter,
    pub log: history::MessageLog,
    pub history_limit: i64,
}

impl Chat {
    pub fn new(db_pool: SqlitePool, history_limit: i64) -> Self {
        let registry = Arc::new(PresenceRegistry::default());
        let log = history::MessageLog::new(db_pool);
        let router = RoomRouter::new(registry.clone(), log.clone());

        Self { registry, router, log, history_limit }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
}
