use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;
use tracing::{debug, error, info};

use crate::{session::{self, UserClaim}, AppResult};

use super::{
    event::{ClientEvent, ErrorCode, ServerEvent},
    presence::ConnHandle,
    Chat,
};

/// Where a connection sits in its lifecycle. Falling out of the event loop
/// is terminal; a reconnecting client gets a fresh upgrade and must join
/// again explicitly.
enum Phase {
    Connecting,
    Joined { room: String },
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(chat): State<Chat>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(claim) = session::user_claim(&session).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    Ok(ws.on_upgrade(async move |socket| run_session(chat, claim, socket).await))
}

async fn run_session(chat: Chat, claim: UserClaim, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = ConnHandle::new(tx);
    let conn_id = conn.id();

    info!("chat connection {conn_id} opened for {}", claim.identity);

    // Outbound pump. Everything the router or this handler queues for the
    // connection leaves through here, so fan-out never awaits the socket.
    let pump = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound events are handled strictly in arrival order; only the shared
    // registry and log see other connections concurrently.
    let mut phase = Phase::Connecting;
    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => handle_event(&chat, &claim, &conn, &mut phase, event).await,
            Err(err) => {
                debug!("malformed frame on {conn_id}: {err}");
                conn.push(ServerEvent::error(ErrorCode::MalformedEvent, err.to_string()));
            }
        }
    }

    chat.registry.cleanup_by_connection(conn_id);
    pump.abort();
    info!("chat connection {conn_id} closed");
}

async fn handle_event(
    chat: &Chat,
    claim: &UserClaim,
    conn: &ConnHandle,
    phase: &mut Phase,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinRoom { room, identity, kind } => {
            if identity != claim.identity || kind != claim.kind {
                conn.push(ServerEvent::error(
                    ErrorCode::IdentityMismatch,
                    "join does not match the session claim",
                ));
                return;
            }

            // One room per connection; switching implies leaving the old one.
            if let Phase::Joined { room: old } = phase {
                if *old != room {
                    chat.registry.leave(old, &claim.identity);
                }
            }

            let replay = chat
                .router
                .join(&room, &identity, kind, conn.clone(), chat.history_limit)
                .await;
            match replay {
                Ok(messages) => {
                    conn.push(ServerEvent::ChatHistory { messages });
                    *phase = Phase::Joined { room };
                }
                Err(err) => {
                    error!("history read for {room} failed: {err}");
                    *phase = Phase::Connecting;
                    conn.push(ServerEvent::error(
                        ErrorCode::StoreUnavailable,
                        "history unavailable, retry the join",
                    ));
                }
            }
        }
        ClientEvent::SendMessage { room, identity, kind, body, timestamp } => {
            let Phase::Joined { room: joined } = phase else {
                debug!("send_message before join, ignoring");
                return;
            };
            if room != *joined {
                conn.push(ServerEvent::error(
                    ErrorCode::NotInRoom,
                    format!("not joined to {room}"),
                ));
                return;
            }
            if identity != claim.identity || kind != claim.kind {
                conn.push(ServerEvent::error(
                    ErrorCode::IdentityMismatch,
                    "message does not match the session claim",
                ));
                return;
            }
            if body.trim().is_empty() {
                debug!("empty message body from {identity}, ignoring");
                return;
            }

            if let Err(err) = chat
                .router
                .broadcast_message(&room, conn.id(), &identity, kind, &body, timestamp)
                .await
            {
                error!("append to {room} failed: {err}");
                conn.push(ServerEvent::error(
                    ErrorCode::StoreUnavailable,
                    "message not stored, retry the send",
                ));
            }
        }
        ClientEvent::Typing { room, identity, is_typing } => {
            let Phase::Joined { room: joined } = phase else {
                debug!("typing before join, ignoring");
                return;
            };
            if room != *joined {
                conn.push(ServerEvent::error(
                    ErrorCode::NotInRoom,
                    format!("not joined to {room}"),
                ));
                return;
            }
            if identity != claim.identity {
                conn.push(ServerEvent::error(
                    ErrorCode::IdentityMismatch,
                    "typing does not match the session claim",
                ));
                return;
            }

            chat.router.broadcast_typing(&room, conn.id(), &identity, is_typing);
        }
        ClientEvent::FetchHistory { room, before, limit } => {
            let Phase::Joined { room: joined } = phase else {
                debug!("fetch_history before join, ignoring");
                return;
            };
            if room != *joined {
                conn.push(ServerEvent::error(
                    ErrorCode::NotInRoom,
                    format!("not joined to {room}"),
                ));
                return;
            }

            let limit = limit.clamp(1, chat.history_limit);
            match chat.log.before(&room, before, limit).await {
                Ok(messages) => {
                    conn.push(ServerEvent::HistoryPage { messages });
                }
                Err(err) => {
                    error!("history page for {room} failed: {err}");
                    conn.push(ServerEvent::error(
                        ErrorCode::StoreUnavailable,
                        "history unavailable, retry the fetch",
                    ));
                }
            }
        }
    }
}
