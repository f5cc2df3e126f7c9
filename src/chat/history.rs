use sqlx::SqlitePool;

use super::event::{ChatMessage, ParticipantKind};

pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id TEXT NOT NULL,
            identity TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL,
            client_ts INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS messages_room ON messages (room_id, seq)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Append-only per-room message log, kept in the shared relational store so
/// replay survives the process. Appends and reads here are the only places
/// the realtime core awaits anything.
#[derive(Clone)]
pub struct MessageLog {
    pool: SqlitePool,
}

impl MessageLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message to the tail of the room's log; returns it with
    /// the server-assigned sequence number.
    pub async fn append(
        &self,
        room: &str,
        identity: &str,
        kind: ParticipantKind,
        body: &str,
        timestamp: i64,
    ) -> Result<ChatMessage, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO messages (room_id,identity,kind,body,client_ts) VALUES (?,?,?,?,?)",
        )
        .bind(room)
        .bind(identity)
        .bind(kind)
        .bind(body)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(ChatMessage {
            seq: result.last_insert_rowid(),
            identity: identity.to_owned(),
            kind,
            body: body.to_owned(),
            timestamp,
        })
    }

    /// The newest `limit` messages of a room, oldest first. This is the
    /// one-time replay a joining connection gets.
    pub async fn recent(&self, room: &str, limit: i64) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i64, String, ParticipantKind, String, i64)>(
            "SELECT seq,identity,kind,body,client_ts FROM messages
             WHERE room_id=? ORDER BY seq DESC LIMIT ?",
        )
        .bind(room)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().rev().map(row_to_message).collect())
    }

    /// Up to `limit` messages with `seq` below `before`, oldest first.
    /// Clients page backwards through older history with this.
    pub async fn before(
        &self,
        room: &str,
        before: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i64, String, ParticipantKind, String, i64)>(
            "SELECT seq,identity,kind,body,client_ts FROM messages
             WHERE room_id=? AND seq<? ORDER BY seq DESC LIMIT ?",
        )
        .bind(room)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().rev().map(row_to_message).collect())
    }
}

fn row_to_message(
    (seq, identity, kind, body, timestamp): (i64, String, ParticipantKind, String, i64),
) -> ChatMessage {
    ChatMessage { seq, identity, kind, body, timestamp }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn test_log() -> MessageLog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_db(&pool).await.unwrap();
        MessageLog::new(pool)
    }

    #[tokio::test]
    async fn replay_preserves_append_order() {
        let log = test_log().await;

        log.append("r1", "u1", ParticipantKind::Staff, "one", 30).await.unwrap();
        log.append("r1", "u2", ParticipantKind::Candidate, "two", 20).await.unwrap();
        log.append("r1", "u1", ParticipantKind::Staff, "three", 10).await.unwrap();

        let messages = log.recent("r1", 200).await.unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        // Server-receipt order, regardless of the client timestamps.
        assert_eq!(bodies, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn rooms_have_independent_logs() {
        let log = test_log().await;

        log.append("r1", "u1", ParticipantKind::Staff, "for r1", 1).await.unwrap();
        log.append("r2", "u3", ParticipantKind::Staff, "for r2", 2).await.unwrap();

        let r1 = log.recent("r1", 200).await.unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].body, "for r1");

        let empty = log.recent("r3", 200).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn replay_is_capped_to_the_newest_messages() {
        let log = test_log().await;
        for i in 0..10 {
            log.append("r1", "u1", ParticipantKind::Staff, &format!("m{i}"), i).await.unwrap();
        }

        let messages = log.recent("r1", 3).await.unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn paging_walks_backwards_from_a_sequence() {
        let log = test_log().await;
        let mut seqs = Vec::new();
        for i in 0..6 {
            let msg = log.append("r1", "u1", ParticipantKind::Staff, &format!("m{i}"), i).await.unwrap();
            seqs.push(msg.seq);
        }

        let replay = log.recent("r1", 2).await.unwrap();
        assert_eq!(replay[0].seq, seqs[4]);

        let page = log.before("r1", replay[0].seq, 2).await.unwrap();
        let bodies: Vec<_> = page.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["m2", "m3"]);

        let rest = log.before("r1", page[0].seq, 200).await.unwrap();
        let bodies: Vec<_> = rest.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["m0", "m1"]);
    }

    #[tokio::test]
    async fn append_round_trips_kind_and_timestamp() {
        let log = test_log().await;
        let appended = log
            .append("r1", "u2", ParticipantKind::Candidate, "hello", 1000)
            .await
            .unwrap();

        let stored = log.recent("r1", 1).await.unwrap();
        assert_eq!(stored, vec![appended]);
        assert_eq!(stored[0].kind, ParticipantKind::Candidate);
        assert_eq!(stored[0].timestamp, 1000);
    }
}
