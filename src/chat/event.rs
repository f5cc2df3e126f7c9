use serde::{Deserialize, Serialize};

/// Role of a chat participant, as asserted by the portal's auth system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ParticipantKind {
    Staff,
    Candidate,
}

/// One persisted chat utterance. `seq` is the server-assigned append order
/// within the room; `timestamp` is the client's send time and stays opaque
/// payload, it never orders anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub seq: i64,
    pub identity: String,
    pub kind: ParticipantKind,
    pub body: String,
    pub timestamp: i64,
}

/// Events a client may send over the socket, decoded at the connection
/// boundary. Frames that don't fit one of these shapes are answered with
/// [`ServerEvent::Error`] instead of being trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        room: String,
        identity: String,
        kind: ParticipantKind,
    },
    SendMessage {
        room: String,
        identity: String,
        kind: ParticipantKind,
        body: String,
        timestamp: i64,
    },
    Typing {
        room: String,
        identity: String,
        is_typing: bool,
    },
    FetchHistory {
        room: String,
        before: i64,
        limit: i64,
    },
}

/// Events the server pushes down a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Replay of the newest stored messages, oldest first. Sent once, to
    /// the joining connection only.
    ChatHistory { messages: Vec<ChatMessage> },
    /// Older messages requested with `fetch_history`, oldest first.
    HistoryPage { messages: Vec<ChatMessage> },
    ReceiveMessage(ChatMessage),
    UserTyping { identity: String, is_typing: bool },
    Error {
        code: ErrorCode,
        message: String,
        retryable: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedEvent,
    IdentityMismatch,
    NotInRoom,
    StoreUnavailable,
}

impl ServerEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
            retryable: matches!(code, ErrorCode::StoreUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_decodes() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"join_room","data":{"room":"hr-applicant-chat","identity":"u1","kind":"staff"}}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                room: "hr-applicant-chat".to_owned(),
                identity: "u1".to_owned(),
                kind: ParticipantKind::Staff,
            }
        );
    }

    #[test]
    fn typing_uses_camel_case_fields() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"typing","data":{"room":"r1","identity":"u1","isTyping":true}}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::Typing {
                room: "r1".to_owned(),
                identity: "u1".to_owned(),
                is_typing: true,
            }
        );
    }

    #[test]
    fn user_typing_encodes_tagged() {
        let json = serde_json::to_value(ServerEvent::UserTyping {
            identity: "u2".to_owned(),
            is_typing: false,
        })
        .unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "event": "user_typing",
                "data": { "identity": "u2", "isTyping": false }
            })
        );
    }

    #[test]
    fn receive_message_carries_the_message_as_data() {
        let json = serde_json::to_value(ServerEvent::ReceiveMessage(ChatMessage {
            seq: 7,
            identity: "u1".to_owned(),
            kind: ParticipantKind::Candidate,
            body: "hello".to_owned(),
            timestamp: 1000,
        }))
        .unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "event": "receive_message",
                "data": {
                    "seq": 7,
                    "identity": "u1",
                    "kind": "candidate",
                    "body": "hello",
                    "timestamp": 1000
                }
            })
        );
    }

    #[test]
    fn missing_field_is_rejected() {
        let result = serde_json::from_str::<ClientEvent>(
            r#"{"event":"send_message","data":{"room":"r1","identity":"u1"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let result = serde_json::from_str::<ClientEvent>(
            r#"{"event":"shutdown","data":{}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn store_errors_are_retryable() {
        let ServerEvent::Error { retryable, .. } =
            ServerEvent::error(ErrorCode::StoreUnavailable, "log down")
        else {
            panic!("expected an error event");
        };
        assert!(retryable);

        let ServerEvent::Error { retryable, .. } =
            ServerEvent::error(ErrorCode::MalformedEvent, "bad frame")
        else {
            panic!("expected an error event");
        };
        assert!(!retryable);
    }
}
