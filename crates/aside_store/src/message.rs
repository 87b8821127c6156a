//! Unread-text source over the messages database.

use crate::{map_sqlx, read_only_pool};
use aside_core::{Channel, Event, EventSource, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// Reads inbound unread messages, joined with their sender handle and
/// chat name. The store keeps timestamps as nanoseconds (INTEGER) from
/// the 2001-01-01 reference date.
pub struct MessageStoreSource {
    pool: Pool<Sqlite>,
    limit: u32,
}

impl MessageStoreSource {
    pub fn new<P: AsRef<Path>>(db_path: P, limit: u32) -> Self {
        Self {
            pool: read_only_pool(db_path.as_ref()),
            limit,
        }
    }
}

#[async_trait]
impl EventSource for MessageStoreSource {
    fn channel(&self) -> Channel {
        Channel::Message
    }

    async fn poll(&self, newer_than: DateTime<Utc>) -> Result<Vec<Event>, SourceError> {
        let watermark = Channel::Message.utc_to_native(newer_than);

        // Most recent N, handed back oldest-first.
        let mut rows = sqlx::query(
            r#"
            SELECT
                m.text,
                m.date,
                h.id AS sender,
                c.display_name AS chat_name
            FROM message m
            LEFT JOIN handle h ON m.handle_id = h.ROWID
            LEFT JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
            LEFT JOIN chat c ON cmj.chat_id = c.ROWID
            WHERE m.is_from_me = 0 AND m.is_read = 0 AND m.date > ?
            ORDER BY m.date DESC
            LIMIT ?
            "#,
        )
        .bind(watermark)
        .bind(self.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.reverse();

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let text: Option<String> = row.try_get("text").map_err(map_sqlx)?;
            let date: Option<i64> = row.try_get("date").map_err(map_sqlx)?;
            let sender: Option<String> = row.try_get("sender").map_err(map_sqlx)?;
            let chat_name: Option<String> = row.try_get("chat_name").map_err(map_sqlx)?;

            let Some(native_ts) = date else {
                tracing::debug!("message without timestamp, skipping");
                continue;
            };
            let Some(occurred_at) = Channel::Message.native_to_utc(native_ts) else {
                tracing::debug!(native_ts, "message timestamp out of range, skipping");
                continue;
            };

            events.push(Event {
                channel: Channel::Message,
                raw_identity: sender.unwrap_or_default(),
                occurred_at,
                native_ts,
                display_name: chat_name.filter(|n| !n.is_empty()),
                payload: text,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn fixture_db(path: &Path) -> Pool<Sqlite> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        for ddl in [
            "CREATE TABLE message (ROWID INTEGER PRIMARY KEY, text TEXT, date INTEGER, is_from_me INTEGER, is_read INTEGER, handle_id INTEGER)",
            "CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT)",
            "CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, display_name TEXT)",
            "CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER)",
        ] {
            sqlx::query(ddl).execute(&pool).await.unwrap();
        }
        pool
    }

    async fn insert_handle(pool: &Pool<Sqlite>, rowid: i64, id: &str) {
        sqlx::query("INSERT INTO handle (ROWID, id) VALUES (?, ?)")
            .bind(rowid)
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn insert_message(
        pool: &Pool<Sqlite>,
        rowid: i64,
        text: &str,
        at: DateTime<Utc>,
        from_me: i32,
        read: i32,
        handle_id: i64,
    ) {
        sqlx::query(
            "INSERT INTO message (ROWID, text, date, is_from_me, is_read, handle_id) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(rowid)
        .bind(text)
        .bind(Channel::Message.utc_to_native(at))
        .bind(from_me)
        .bind(read)
        .bind(handle_id)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn polls_inbound_unread_texts_with_sender_and_chat_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        let pool = fixture_db(&db).await;

        let now = Utc::now();
        insert_handle(&pool, 1, "+15551234567").await;
        insert_message(&pool, 10, "are you around?", now - Duration::seconds(20), 0, 0, 1).await;
        sqlx::query("INSERT INTO chat (ROWID, display_name) VALUES (1, 'Ana')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, 10)")
            .execute(&pool)
            .await
            .unwrap();

        // Already read: ignored.
        insert_message(&pool, 11, "old news", now - Duration::seconds(25), 0, 1, 1).await;
        // Sent by the owner: ignored.
        insert_message(&pool, 12, "my own text", now - Duration::seconds(15), 1, 0, 1).await;
        drop(pool);

        let source = MessageStoreSource::new(&db, 10);
        let events = source.poll(now - Duration::seconds(60)).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].raw_identity, "+15551234567");
        assert_eq!(events[0].display_name.as_deref(), Some("Ana"));
        assert_eq!(events[0].payload.as_deref(), Some("are you around?"));
        assert_eq!(events[0].channel, Channel::Message);
    }

    #[tokio::test]
    async fn watermark_excludes_older_messages() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        let pool = fixture_db(&db).await;

        let now = Utc::now();
        insert_handle(&pool, 1, "+15551234567").await;
        insert_message(&pool, 1, "stale", now - Duration::seconds(600), 0, 0, 1).await;
        insert_message(&pool, 2, "fresh", now - Duration::seconds(5), 0, 0, 1).await;
        drop(pool);

        let source = MessageStoreSource::new(&db, 10);
        let events = source.poll(now - Duration::seconds(60)).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn message_without_handle_yields_empty_identity() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        let pool = fixture_db(&db).await;

        let now = Utc::now();
        // handle_id points nowhere; LEFT JOIN leaves sender NULL.
        insert_message(&pool, 1, "mystery", now - Duration::seconds(5), 0, 0, 99).await;
        drop(pool);

        let source = MessageStoreSource::new(&db, 10);
        let events = source.poll(now - Duration::seconds(60)).await.unwrap();

        assert_eq!(events.len(), 1);
        assert!(events[0].raw_identity.is_empty());
    }
}
