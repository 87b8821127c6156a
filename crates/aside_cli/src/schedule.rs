//! One-shot delayed sends.
//!
//! A much simpler timer loop than the monitor: a JSON file of pending
//! entries, checked on a coarse cadence; entries whose time has arrived
//! are sent once and removed, with no deduplication beyond removal.

use anyhow::{Context, Result};
use aside_core::{normalize, Allowlist, MessageSender};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub recipient: String,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub struct ScheduledSender {
    path: PathBuf,
    allowlist: Arc<Allowlist>,
    sender: Arc<dyn MessageSender>,
}

impl ScheduledSender {
    pub fn new(path: PathBuf, allowlist: Arc<Allowlist>, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            path,
            allowlist,
            sender,
        }
    }

    fn load(&self) -> Vec<ScheduledMessage> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "corrupt schedule file, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    fn save(&self, entries: &[ScheduledMessage]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries).context("serializing schedule")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("writing schedule temp file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing schedule file {}", self.path.display()))?;
        Ok(())
    }

    /// Queue a message. Only whitelisted recipients can be scheduled.
    pub async fn add(
        &self,
        recipient: &str,
        message: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<ScheduledMessage> {
        let identity = normalize(recipient);
        if !self.allowlist.contains(&identity).await {
            anyhow::bail!("{recipient} is not on the whitelist");
        }
        let entry = ScheduledMessage {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            message: message.to_string(),
            scheduled_time,
            created_at: Utc::now(),
        };
        let mut entries = self.load();
        entries.push(entry.clone());
        self.save(&entries)?;
        tracing::info!(id = %entry.id, recipient, at = %scheduled_time, "scheduled message");
        Ok(entry)
    }

    /// Pending entries, soonest first.
    pub fn list(&self) -> Vec<ScheduledMessage> {
        let mut entries = self.load();
        entries.sort_by_key(|e| e.scheduled_time);
        entries
    }

    /// Returns `true` if an entry with that id existed.
    pub fn cancel(&self, id: Uuid) -> Result<bool> {
        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    /// Send every entry whose time has arrived. Due entries are removed
    /// whether delivery succeeded or not — this is a one-shot queue, not
    /// the dedup-guarded monitor path. Returns the number sent.
    pub async fn run_pending(&self, now: DateTime<Utc>) -> Result<usize> {
        let entries = self.load();
        let (due, pending): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|e| e.scheduled_time <= now);
        if due.is_empty() {
            return Ok(0);
        }

        let mut sent = 0;
        for entry in &due {
            match self.sender.deliver(&entry.recipient, &entry.message).await {
                Ok(()) => {
                    tracing::info!(id = %entry.id, recipient = %entry.recipient, "scheduled message sent");
                    sent += 1;
                }
                Err(e) => {
                    tracing::error!(id = %entry.id, recipient = %entry.recipient, error = %e, "scheduled send failed");
                }
            }
        }
        self.save(&pending)?;
        Ok(sent)
    }

    /// Run the timer loop until the task is aborted.
    pub fn spawn(self: Arc<Self>, tick: Duration, backoff: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(path = %self.path.display(), "scheduled-send loop started");
            loop {
                match self.run_pending(Utc::now()).await {
                    Ok(_) => tokio::time::sleep(tick).await,
                    Err(e) => {
                        tracing::error!(error = %e, "scheduler pass failed, backing off");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aside_reply::RecordingSender;
    use chrono::Duration as ChronoDuration;

    struct Fixture {
        _dir: tempfile::TempDir,
        scheduler: ScheduledSender,
        sender: Arc<RecordingSender>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let allowlist = Arc::new(Allowlist::open(dir.path().join("allowlist.json")));
        allowlist.add("+15551234567", None).await.unwrap();
        let sender = Arc::new(RecordingSender::new());
        let scheduler = ScheduledSender::new(
            dir.path().join("scheduled.json"),
            allowlist,
            sender.clone(),
        );
        Fixture {
            _dir: dir,
            scheduler,
            sender,
        }
    }

    #[tokio::test]
    async fn due_entries_are_sent_and_removed() {
        let fx = fixture().await;
        let now = Utc::now();
        fx.scheduler
            .add("+15551234567", "happy birthday!", now - ChronoDuration::seconds(5))
            .await
            .unwrap();
        fx.scheduler
            .add("+15551234567", "later", now + ChronoDuration::hours(1))
            .await
            .unwrap();

        let sent = fx.scheduler.run_pending(now).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(fx.sender.attempt_count(), 1);
        assert_eq!(fx.sender.attempts()[0].1, "happy birthday!");

        // The future entry survives; the due one is gone.
        let remaining = fx.scheduler.list();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "later");
    }

    #[tokio::test]
    async fn failed_sends_are_still_removed() {
        let fx = fixture().await;
        let now = Utc::now();
        fx.scheduler
            .add("+15551234567", "doomed", now - ChronoDuration::seconds(1))
            .await
            .unwrap();
        fx.sender
            .fail_next(aside_core::DeliveryError::Command("nope".into()));

        let sent = fx.scheduler.run_pending(now).await.unwrap();
        assert_eq!(sent, 0);
        assert!(fx.scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn non_whitelisted_recipient_is_rejected() {
        let fx = fixture().await;
        let result = fx
            .scheduler
            .add("+19998887777", "hi", Utc::now() + ChronoDuration::minutes(5))
            .await;
        assert!(result.is_err());
        assert!(fx.scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn cancel_by_id() {
        let fx = fixture().await;
        let entry = fx
            .scheduler
            .add("+15551234567", "hi", Utc::now() + ChronoDuration::minutes(5))
            .await
            .unwrap();

        assert!(fx.scheduler.cancel(entry.id).unwrap());
        assert!(!fx.scheduler.cancel(entry.id).unwrap());
        assert!(fx.scheduler.list().is_empty());
    }
}
