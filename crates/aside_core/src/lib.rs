pub mod allowlist;
pub mod config;
pub mod dnd;
pub mod error;
pub mod event;
pub mod identity;
pub mod status;

pub use allowlist::Allowlist;
pub use config::AsideConfig;
pub use dnd::{DndGate, DndTransition};
pub use error::{DeliveryError, SourceError};
pub use event::{Channel, DedupKey, Event};
pub use identity::{normalize, CanonicalIdentity};
pub use status::{ActivityEntry, StatusBoard, StatusSnapshot};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A calendar commitment overlapping "now", used to explain why the
/// owner is unavailable.
#[derive(Debug, Clone, Serialize)]
pub struct Commitment {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
}

/// Reads new records from one native store.
///
/// `newer_than` is the watermark: implementations return records strictly
/// after it, oldest first, bounded to a small count. A temporarily
/// unreachable store is a recoverable [`SourceError`], never a panic; the
/// two channels are polled independently so one failing store never blocks
/// the other.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn channel(&self) -> Channel;
    async fn poll(&self, newer_than: DateTime<Utc>) -> Result<Vec<Event>, SourceError>;
}

/// Looks up the owner's current calendar commitment, if any.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn current_commitment(&self) -> anyhow::Result<Option<Commitment>>;
}

/// Produces the reply text for a detected event.
#[async_trait]
pub trait ReplyComposer: Send + Sync {
    async fn compose(
        &self,
        event: &Event,
        commitment: Option<&Commitment>,
    ) -> anyhow::Result<String>;
}

/// Delivers an outbound reply through the device's messaging channel.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), DeliveryError>;
}
