//! Missed-call source over the call history database.

use crate::{map_sqlx, read_only_pool};
use aside_core::{Channel, Event, EventSource, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// Reads unanswered, inbound call records. The store keeps timestamps as
/// seconds (REAL) from the 2001-01-01 reference date.
pub struct CallHistorySource {
    pool: Pool<Sqlite>,
    limit: u32,
}

impl CallHistorySource {
    pub fn new<P: AsRef<Path>>(db_path: P, limit: u32) -> Self {
        Self {
            pool: read_only_pool(db_path.as_ref()),
            limit,
        }
    }
}

#[async_trait]
impl EventSource for CallHistorySource {
    fn channel(&self) -> Channel {
        Channel::Call
    }

    async fn poll(&self, newer_than: DateTime<Utc>) -> Result<Vec<Event>, SourceError> {
        let watermark = Channel::Call.utc_to_native(newer_than) as f64;

        // Most recent N, handed back oldest-first.
        let mut rows = sqlx::query(
            r#"
            SELECT ZADDRESS, ZDATE, ZNAME
            FROM ZCALLRECORD
            WHERE ZANSWERED = 0 AND ZORIGINATED = 0 AND ZDATE > ?
            ORDER BY ZDATE DESC
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
            let address: Option<String> = row.try_get("ZADDRESS").map_err(map_sqlx)?;
            let date: Option<f64> = row.try_get("ZDATE").map_err(map_sqlx)?;
            let name: Option<String> = row.try_get("ZNAME").map_err(map_sqlx)?;

            // Second granularity is this channel's native resolution.
            let native_ts = match date {
                Some(d) => d.floor() as i64,
                None => {
                    tracing::debug!("call record without timestamp, skipping");
                    continue;
                }
            };
            let Some(occurred_at) = Channel::Call.native_to_utc(native_ts) else {
                tracing::debug!(native_ts, "call timestamp out of range, skipping");
                continue;
            };

            events.push(Event {
                channel: Channel::Call,
                raw_identity: address.unwrap_or_default(),
                occurred_at,
                native_ts,
                display_name: name.filter(|n| !n.is_empty()),
                payload: None,
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
        sqlx::query(
            r#"
            CREATE TABLE ZCALLRECORD (
                Z_PK INTEGER PRIMARY KEY,
                ZADDRESS TEXT,
                ZDATE REAL,
                ZNAME TEXT,
                ZANSWERED INTEGER,
                ZORIGINATED INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    async fn insert_call(
        pool: &Pool<Sqlite>,
        address: &str,
        at: DateTime<Utc>,
        name: Option<&str>,
        answered: i32,
        originated: i32,
    ) {
        sqlx::query(
            "INSERT INTO ZCALLRECORD (ZADDRESS, ZDATE, ZNAME, ZANSWERED, ZORIGINATED) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(address)
        .bind(Channel::Call.utc_to_native(at) as f64)
        .bind(name)
        .bind(answered)
        .bind(originated)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn polls_only_missed_inbound_calls_after_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("CallHistory.storedata");
        let pool = fixture_db(&db).await;

        let now = Utc::now();
        insert_call(&pool, "+15551234567", now - Duration::seconds(10), Some("Ana"), 0, 0).await;
        // Answered: not a missed call.
        insert_call(&pool, "+15550000001", now - Duration::seconds(12), None, 1, 0).await;
        // Outgoing: not a contact attempt.
        insert_call(&pool, "+15550000002", now - Duration::seconds(14), None, 0, 1).await;
        // Before the watermark.
        insert_call(&pool, "+15550000003", now - Duration::seconds(300), None, 0, 0).await;
        drop(pool);

        let source = CallHistorySource::new(&db, 10);
        let events = source.poll(now - Duration::seconds(60)).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].raw_identity, "+15551234567");
        assert_eq!(events[0].display_name.as_deref(), Some("Ana"));
        assert_eq!(events[0].channel, Channel::Call);
        assert!(events[0].payload.is_none());
    }

    #[tokio::test]
    async fn results_are_oldest_first_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("CallHistory.storedata");
        let pool = fixture_db(&db).await;

        let now = Utc::now();
        for i in 0..5 {
            insert_call(
                &pool,
                &format!("+1555000{i:04}"),
                now - Duration::seconds(30 - i),
                None,
                0,
                0,
            )
            .await;
        }
        drop(pool);

        let source = CallHistorySource::new(&db, 3);
        let events = source.poll(now - Duration::seconds(60)).await.unwrap();

        // The 3 most recent of the 5, oldest-first.
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].occurred_at <= w[1].occurred_at));
        assert_eq!(events[0].raw_identity, "+15550000002");
        assert_eq!(events[2].raw_identity, "+15550000004");
    }

    #[tokio::test]
    async fn missing_store_is_a_recoverable_error() {
        let source = CallHistorySource::new("/nonexistent/CallHistory.storedata", 10);
        let err = source.poll(Utc::now()).await.unwrap_err();
        // Either classification is fine; it must be an Err, not a panic.
        match err {
            SourceError::Unavailable(_) | SourceError::Query(_) => {}
        }
    }
}
