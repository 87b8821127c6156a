//! Gateway payloads.

use aside_core::{ActivityEntry, Commitment, DndTransition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound DND state change, posted by the device automation.
#[derive(Debug, Clone, Deserialize)]
pub struct DndUpdate {
    #[serde(default)]
    pub dnd_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DndAck {
    pub status: String,
    pub dnd_enabled: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub dnd_enabled: bool,
    pub current_event: Option<Commitment>,
    pub whitelist_count: usize,
    pub replies_sent: u64,
    pub recent_activity: Vec<ActivityEntry>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub history: Vec<DndTransition>,
    pub total_entries: usize,
}

#[derive(Debug, Serialize)]
pub struct WhitelistView {
    pub phone_numbers: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistChange {
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WhitelistAck {
    pub success: bool,
    pub phone_number: String,
    pub message: String,
}
