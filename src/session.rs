use tower_sessions::Session;

use crate::{chat::ParticipantKind, AppResult};

pub const USER_ID: &str = "user_id";
pub const USER_KIND: &str = "user_kind";

/// The identity + role claim the external auth system leaves in the cookie
/// session. The chat layer trusts nothing else about the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserClaim {
    pub identity: String,
    pub kind: ParticipantKind,
}

pub async fn user_claim(session: &Session) -> AppResult<Option<UserClaim>> {
    let Some(identity) = session.get::<String>(USER_ID).await? else {
        return Ok(None);
    };
    let Some(kind) = session.get::<ParticipantKind>(USER_KIND).await? else {
        return Ok(None);
    };

    Ok(Some(UserClaim { identity, kind }))
}
