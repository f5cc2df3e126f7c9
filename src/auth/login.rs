use axum::{debug_handler, http::StatusCode, Json};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::{chat::ParticipantKind, session::{USER_ID, USER_KIND}, AppResult};

/// What the portal's auth system hands us once it has verified the user:
/// the portal user id plus the portal role mapped onto the chat roles
/// (hr -> staff, applicant -> candidate).
#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    identity: String,
    kind: ParticipantKind,
}

#[debug_handler]
pub(crate) async fn login(
    session: Session,
    Json(LoginRequest { identity, kind }): Json<LoginRequest>,
) -> AppResult<StatusCode> {
    session.insert(USER_ID, &identity).await?;
    session.insert(USER_KIND, kind).await?;

    info!("session opened for {identity}");
    Ok(StatusCode::NO_CONTENT)
}
