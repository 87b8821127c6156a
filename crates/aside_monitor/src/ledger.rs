//! Bookkeeping of events that already produced a reply.
//!
//! Presence of a key means "handled". Keys are only ever inserted after a
//! confirmed delivery, and are evicted by age so the ledger stays bounded
//! no matter how long the process runs. The ledger is process-local and
//! intentionally lost on restart; the worst case after a crash is one
//! duplicate reply, never a silently dropped event.

use aside_core::DedupKey;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DedupLedger {
    handled: HashSet<DedupKey>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_handled(&self, key: &DedupKey) -> bool {
        self.handled.contains(key)
    }

    /// Record a key as handled. Marking an already-marked key is a no-op.
    pub fn mark_handled(&mut self, key: DedupKey) {
        self.handled.insert(key);
    }

    /// Drop every key whose embedded event time is before `cutoff`.
    ///
    /// Keys that fail to decode are dropped too: a corrupt key would
    /// otherwise survive every eviction pass and pin memory forever.
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) {
        let before = self.handled.len();
        self.handled
            .retain(|key| matches!(key.decoded_at(), Some(at) if at >= cutoff));
        let evicted = before - self.handled.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.handled.len(), "evicted ledger entries");
        }
    }

    pub fn len(&self) -> usize {
        self.handled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handled.is_empty()
    }
}
