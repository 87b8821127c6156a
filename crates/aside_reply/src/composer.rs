//! Reply text generation.
//!
//! Two composers share one trait: `LlmComposer` asks an LLM for a short
//! contextual reply and falls back to `TemplateComposer` on any failure;
//! `TemplateComposer` alone is used when no API key is configured.

use crate::api_types::{Message, MessagesRequest, MessagesResponse};
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use aside_core::config::ReplySettings;
use aside_core::{Channel, Commitment, Event, ReplyComposer};
use async_trait::async_trait;
use chrono::Local;
use std::env;

// ============================================================================
// Template fallback
// ============================================================================

/// Deterministic reply strings; always available, no I/O.
#[derive(Debug, Clone)]
pub struct TemplateComposer {
    owner_name: String,
    signature: String,
}

impl TemplateComposer {
    pub fn new(settings: &ReplySettings) -> Self {
        Self {
            owner_name: settings.owner_name.clone(),
            signature: settings.signature.clone(),
        }
    }

    fn render(&self, commitment: Option<&Commitment>) -> String {
        match commitment {
            Some(c) => {
                let until = c.end.with_timezone(&Local).format("%H:%M");
                match c.location.as_deref().filter(|l| !l.is_empty()) {
                    Some(loc) => format!(
                        "{} is currently at {} ({}) until {}... try again then! {}",
                        self.owner_name, c.summary, loc, until, self.signature
                    ),
                    None => format!(
                        "{} is currently at {} until {}... try again then! {}",
                        self.owner_name, c.summary, until, self.signature
                    ),
                }
            }
            None => format!(
                "{} is unavailable right now and will get back to you soon! {}",
                self.owner_name, self.signature
            ),
        }
    }
}

#[async_trait]
impl ReplyComposer for TemplateComposer {
    async fn compose(&self, _event: &Event, commitment: Option<&Commitment>) -> Result<String> {
        Ok(self.render(commitment))
    }
}

// ============================================================================
// LLM composer
// ============================================================================

pub struct LlmComposer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    signature: String,
    fallback: TemplateComposer,
}

impl LlmComposer {
    /// Build from `ANTHROPIC_API_KEY`. Returns `Ok(None)` when the key is
    /// unset — the caller then runs on the template composer alone.
    pub fn from_env(settings: &ReplySettings) -> Result<Option<Self>> {
        let Ok(api_key) = env::var("ANTHROPIC_API_KEY") else {
            tracing::warn!("ANTHROPIC_API_KEY not set, replies will use the template composer");
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building HTTP client for reply composition")?;
        Ok(Some(Self {
            client,
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            signature: settings.signature.clone(),
            fallback: TemplateComposer::new(settings),
        }))
    }

    fn system_prompt(&self) -> String {
        format!(
            "You write brief, friendly auto-replies on behalf of {owner}, who is \
             currently unavailable. Keep it to one or two sentences, mention what \
             {owner} is doing if a calendar commitment is given, suggest when to try \
             again based on its end time, and end with \"{sig}\".",
            owner = self.fallback.owner_name,
            sig = self.signature
        )
    }

    fn user_prompt(&self, event: &Event, commitment: Option<&Commitment>) -> String {
        let attempt = match event.channel {
            Channel::Call => "just called and was not answered",
            Channel::Message => "just sent a text that went unread",
        };
        match commitment {
            Some(c) => {
                let until = c.end.with_timezone(&Local).format("%H:%M");
                format!(
                    "Someone {attempt}. Current commitment: {} (ends {}{}). \
                     Write the reply.",
                    c.summary,
                    until,
                    c.location
                        .as_deref()
                        .filter(|l| !l.is_empty())
                        .map(|l| format!(", at {l}"))
                        .unwrap_or_default()
                )
            }
            None => format!(
                "Someone {attempt}. There is no calendar commitment right now. \
                 Write the reply."
            ),
        }
    }

    async fn generate(&self, event: &Event, commitment: Option<&Commitment>) -> Result<String> {
        let request_body = MessagesRequest {
            model: self.model.clone(),
            system: self.system_prompt(),
            messages: vec![Message::user(self.user_prompt(event, commitment))],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let retry_config = RetryConfig::default();
        let client = &self.client;
        let api_key = &self.api_key;
        let response = with_retry(&retry_config, "Anthropic", || async {
            let resp = client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&request_body)
                .send()
                .await
                .context("Failed to send request to Anthropic")?;
            Ok(resp)
        })
        .await?;

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;
        let mut text = parsed.text();
        if text.is_empty() {
            anyhow::bail!("empty completion");
        }
        if !text.ends_with(&self.signature) {
            text.push(' ');
            text.push_str(&self.signature);
        }
        Ok(text)
    }
}

#[async_trait]
impl ReplyComposer for LlmComposer {
    async fn compose(&self, event: &Event, commitment: Option<&Commitment>) -> Result<String> {
        match self.generate(event, commitment).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(error = %e, "LLM composition failed, using template fallback");
                self.fallback.compose(event, commitment).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn settings() -> ReplySettings {
        ReplySettings {
            owner_name: "Maya".into(),
            signature: "- MayaBot".into(),
            ..ReplySettings::default()
        }
    }

    fn event() -> Event {
        Event {
            channel: Channel::Call,
            raw_identity: "+15551234567".into(),
            occurred_at: Utc::now(),
            native_ts: 0,
            display_name: None,
            payload: None,
        }
    }

    #[tokio::test]
    async fn template_without_commitment() {
        let composer = TemplateComposer::new(&settings());
        let text = composer.compose(&event(), None).await.unwrap();
        assert!(text.starts_with("Maya is unavailable"));
        assert!(text.ends_with("- MayaBot"));
    }

    #[tokio::test]
    async fn template_mentions_commitment_and_location() {
        let composer = TemplateComposer::new(&settings());
        let commitment = Commitment {
            summary: "team standup".into(),
            start: Utc::now() - Duration::minutes(10),
            end: Utc::now() + Duration::minutes(20),
            location: Some("Room 4".into()),
        };
        let text = composer.compose(&event(), Some(&commitment)).await.unwrap();
        assert!(text.contains("team standup"));
        assert!(text.contains("(Room 4)"));
        assert!(text.ends_with("- MayaBot"));
    }

    #[tokio::test]
    async fn template_skips_empty_location() {
        let composer = TemplateComposer::new(&settings());
        let commitment = Commitment {
            summary: "lunch".into(),
            start: Utc::now(),
            end: Utc::now() + Duration::minutes(30),
            location: Some(String::new()),
        };
        let text = composer.compose(&event(), Some(&commitment)).await.unwrap();
        assert!(!text.contains("()"));
        assert!(text.contains("lunch"));
    }

    #[test]
    fn llm_composer_disabled_without_api_key() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        assert!(LlmComposer::from_env(&settings()).unwrap().is_none());
    }
}
