//! Detected call/message records and their dedup keys.
//!
//! The device stores count time from a 2001-01-01 reference date, at
//! different resolutions per store: the call log records whole seconds,
//! the message store nanoseconds. Both are converted to UTC at ingest,
//! but the raw source-clock value is kept because it is part of the
//! dedup key identity.

use crate::identity::CanonicalIdentity;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Seconds between the stores' reference date (2001-01-01T00:00:00Z)
/// and the Unix epoch.
pub const SOURCE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Which native store an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Call,
    Message,
}

impl Channel {
    /// Short tag used in dedup key encoding and log fields.
    pub fn tag(&self) -> &'static str {
        match self {
            Channel::Call => "call",
            Channel::Message => "msg",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "call" => Some(Channel::Call),
            "msg" => Some(Channel::Message),
            _ => None,
        }
    }

    /// Convert a source-clock value at this channel's native resolution
    /// into UTC. Returns `None` for values outside the representable range.
    pub fn native_to_utc(&self, native_ts: i64) -> Option<DateTime<Utc>> {
        let secs = match self {
            Channel::Call => native_ts.checked_add(SOURCE_EPOCH_OFFSET_SECS)?,
            Channel::Message => (native_ts / NANOS_PER_SEC).checked_add(SOURCE_EPOCH_OFFSET_SECS)?,
        };
        Utc.timestamp_opt(secs, 0).single()
    }

    /// Convert a UTC instant into this channel's native clock value.
    pub fn utc_to_native(&self, at: DateTime<Utc>) -> i64 {
        let secs = at.timestamp() - SOURCE_EPOCH_OFFSET_SECS;
        match self {
            Channel::Call => secs,
            Channel::Message => secs.saturating_mul(NANOS_PER_SEC),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A missed contact attempt read from one of the native stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub channel: Channel,
    /// Caller identifier exactly as the store reported it (may be empty).
    pub raw_identity: String,
    /// Event time converted to UTC.
    pub occurred_at: DateTime<Utc>,
    /// Source-clock value at the channel's native resolution.
    pub native_ts: i64,
    /// Contact or chat name, when the store knows one.
    pub display_name: Option<String>,
    /// Message body for texts; absent for calls.
    pub payload: Option<String>,
}

impl Event {
    /// The key under which a reply to this event is remembered.
    pub fn dedup_key(&self, identity: &CanonicalIdentity) -> DedupKey {
        DedupKey::encode(self.channel, identity, self.native_ts)
    }

    /// Who the reply should be addressed to: the contact name when the
    /// store knows one, otherwise the raw identifier.
    pub fn recipient(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.raw_identity,
        }
    }
}

/// Identity of "this exact event already produced a reply".
///
/// Encoded as `<channel>:<identity>:<native_ts>`. The channel tag keeps
/// call and message timestamps from ever comparing equal, and the raw
/// native value keeps the key exact at the store's own resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn encode(channel: Channel, identity: &CanonicalIdentity, native_ts: i64) -> Self {
        DedupKey(format!("{}:{}:{}", channel.tag(), identity, native_ts))
    }

    /// Rebuild a key from its encoded form. No validation happens here;
    /// a bad encoding simply decodes to `None` and ages out of the ledger.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        DedupKey(raw.into())
    }

    /// Recover the event time embedded in the key.
    ///
    /// Returns `None` when the encoding does not parse; the ledger treats
    /// such keys as expired so corrupted entries can never pin memory.
    pub fn decoded_at(&self) -> Option<DateTime<Utc>> {
        let mut parts = self.0.splitn(3, ':');
        let channel = Channel::from_tag(parts.next()?)?;
        let _identity = parts.next()?;
        let native_ts: i64 = parts.next()?.parse().ok()?;
        channel.native_to_utc(native_ts)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::normalize;

    #[test]
    fn call_native_conversion_is_seconds() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let native = Channel::Call.utc_to_native(at);
        assert_eq!(Channel::Call.native_to_utc(native), Some(at));
    }

    #[test]
    fn message_native_conversion_is_nanoseconds() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let native = Channel::Message.utc_to_native(at);
        assert_eq!(native % 1_000_000_000, 0);
        assert_eq!(Channel::Message.native_to_utc(native), Some(at));
    }

    #[test]
    fn dedup_keys_never_cross_channels() {
        let id = normalize("+1 (555) 123-4567");
        let call = DedupKey::encode(Channel::Call, &id, 777);
        let msg = DedupKey::encode(Channel::Message, &id, 777);
        assert_ne!(call, msg);
    }

    #[test]
    fn dedup_key_roundtrips_event_time() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let id = normalize("5551234567");
        let key = DedupKey::encode(Channel::Call, &id, Channel::Call.utc_to_native(at));
        assert_eq!(key.decoded_at(), Some(at));
    }

    #[test]
    fn malformed_key_decodes_to_none() {
        assert!(DedupKey("garbage".into()).decoded_at().is_none());
        assert!(DedupKey("call:+1555:not-a-number".into()).decoded_at().is_none());
        assert!(DedupKey("fax:+1555:123".into()).decoded_at().is_none());
    }

    #[test]
    fn recipient_prefers_display_name() {
        let ev = Event {
            channel: Channel::Call,
            raw_identity: "+15551234567".into(),
            occurred_at: Utc::now(),
            native_ts: 0,
            display_name: Some("Ana".into()),
            payload: None,
        };
        assert_eq!(ev.recipient(), "Ana");

        let anon = Event {
            display_name: Some(String::new()),
            ..ev
        };
        assert_eq!(anon.recipient(), "+15551234567");
    }
}
