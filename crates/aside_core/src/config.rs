use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AsideConfig {
    pub monitor: MonitorSettings,
    pub stores: StoreSettings,
    pub allowlist: AllowlistSettings,
    pub reply: ReplySettings,
    pub calendar: CalendarSettings,
    pub gateway: GatewaySettings,
    pub schedule: ScheduleSettings,
}

impl AsideConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. Env var overrides are applied after parsing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AsideConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file doesn't exist or is invalid,
    /// return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HOST") {
            self.gateway.host = v;
        }
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(n) = v.parse() {
                self.gateway.port = n;
            }
        }
        if let Ok(v) = std::env::var("ANTHROPIC_MODEL") {
            self.reply.model = v;
        }
        if let Ok(v) = std::env::var("GOOGLE_ACCESS_TOKEN") {
            self.calendar.access_token = Some(v);
        }
        if let Ok(v) = std::env::var("ASIDE_CALL_DB") {
            self.stores.call_db_path = v;
        }
        if let Ok(v) = std::env::var("ASIDE_MESSAGE_DB") {
            self.stores.message_db_path = v;
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_interval_secs: u64,
    /// Sleep after a failed tick before trying again.
    pub error_backoff_secs: u64,
    /// Maximum records fetched per channel per tick.
    pub poll_limit: u32,
    /// Maximum age for a call to still get a reply.
    pub call_recency_secs: u64,
    /// Maximum age for a text to still get a reply.
    pub message_recency_secs: u64,
    /// How long handled-event bookkeeping is retained.
    pub ledger_retention_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            error_backoff_secs: 30,
            poll_limit: 10,
            call_recency_secs: 30,
            message_recency_secs: 60,
            ledger_retention_secs: 1800,
        }
    }
}

impl MonitorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn recency_window(&self, channel: crate::event::Channel) -> chrono::Duration {
        let secs = match channel {
            crate::event::Channel::Call => self.call_recency_secs,
            crate::event::Channel::Message => self.message_recency_secs,
        };
        chrono::Duration::seconds(secs as i64)
    }

    pub fn ledger_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ledger_retention_secs as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub call_db_path: String,
    pub message_db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            call_db_path: "~/Library/Application Support/CallHistoryDB/CallHistory.storedata"
                .to_string(),
            message_db_path: "~/Library/Messages/chat.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllowlistSettings {
    pub path: String,
}

impl Default for AllowlistSettings {
    fn default() -> Self {
        Self {
            path: "close_friends_allowlist.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplySettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// How the owner is referred to in generated replies.
    pub owner_name: String,
    /// Appended to every outbound reply.
    pub signature: String,
    pub send_timeout_secs: u64,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20240620".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            owner_name: "the owner".to_string(),
            signature: "- Aside".to_string(),
            send_timeout_secs: 10,
        }
    }
}

impl ReplySettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    /// Pre-provisioned OAuth bearer token. Absent ⇒ calendar lookup is
    /// disabled and replies are composed without a commitment.
    pub access_token: Option<String>,
    pub calendar_id: String,
    pub lookback_mins: i64,
    pub lookahead_hours: i64,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            access_token: None,
            calendar_id: "primary".to_string(),
            lookback_mins: 30,
            lookahead_hours: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub path: String,
    pub tick_interval_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            path: "scheduled_messages.json".to_string(),
            tick_interval_secs: 30,
            error_backoff_secs: 60,
        }
    }
}

impl ScheduleSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
