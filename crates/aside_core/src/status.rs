//! Published monitor status for the read-only introspection surface.
//!
//! The monitor is the sole writer: it keeps its own working copy and
//! publishes an immutable snapshot once per tick. Readers (the gateway)
//! load whatever snapshot is current; operational visibility only, never
//! correctness.

use crate::event::Channel;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// How many recent dispatch outcomes a snapshot carries.
pub const ACTIVITY_CAP: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub channel: Channel,
    pub identity: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub last_tick: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub replies_sent: u64,
    pub ledger_size: usize,
    /// Newest first, capped at [`ACTIVITY_CAP`].
    pub recent_activity: Vec<ActivityEntry>,
}

impl StatusSnapshot {
    /// Record a dispatch outcome, keeping the list newest-first and bounded.
    pub fn push_activity(&mut self, entry: ActivityEntry) {
        self.recent_activity.insert(0, entry);
        self.recent_activity.truncate(ACTIVITY_CAP);
    }
}

/// Single-writer, many-reader status cell.
#[derive(Debug, Default)]
pub struct StatusBoard {
    current: ArcSwap<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    pub fn load(&self) -> Arc<StatusSnapshot> {
        self.current.load_full()
    }
}
