//! Current-commitment lookup against the Google Calendar API.

use anyhow::{Context, Result};
use aside_core::config::CalendarSettings;
use aside_core::{Commitment, ContextProvider};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<CalendarItem>,
}

#[derive(Debug, Deserialize)]
struct CalendarItem {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    location: Option<String>,
    start: ItemTime,
    end: ItemTime,
}

#[derive(Debug, Deserialize)]
struct ItemTime {
    /// Timed events carry `dateTime`; all-day events carry only `date`
    /// and are not treated as commitments.
    #[serde(rename = "dateTime", default)]
    date_time: Option<DateTime<Utc>>,
}

/// Calendar collaborator. Built without a token it runs disabled and
/// always answers "no commitment" — a missing credential must never
/// abort the monitor loop.
pub struct GoogleCalendarContext {
    client: reqwest::Client,
    token: Option<String>,
    calendar_id: String,
    lookback: Duration,
    lookahead: Duration,
}

impl GoogleCalendarContext {
    pub fn new(settings: &CalendarSettings) -> Result<Self> {
        if settings.access_token.is_none() {
            tracing::warn!("no calendar access token configured, context lookup disabled");
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("building HTTP client for calendar lookup")?;
        Ok(Self {
            client,
            token: settings.access_token.clone(),
            calendar_id: settings.calendar_id.clone(),
            lookback: Duration::minutes(settings.lookback_mins),
            lookahead: Duration::hours(settings.lookahead_hours),
        })
    }
}

#[async_trait]
impl ContextProvider for GoogleCalendarContext {
    async fn current_commitment(&self) -> Result<Option<Commitment>> {
        let Some(token) = &self.token else {
            return Ok(None);
        };

        let now = Utc::now();
        let url = format!(
            "https://www.googleapis.com/calendar/v3/calendars/{}/events",
            self.calendar_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("timeMin", (now - self.lookback).to_rfc3339()),
                ("timeMax", (now + self.lookahead).to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", "5".to_string()),
            ])
            .send()
            .await
            .context("calendar events request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("calendar API error: {}", response.status());
        }
        let body: EventsResponse = response
            .json()
            .await
            .context("parsing calendar events response")?;

        Ok(current_from(&body.items, now))
    }
}

/// Pick the first timed event that overlaps `now`.
fn current_from(items: &[CalendarItem], now: DateTime<Utc>) -> Option<Commitment> {
    items.iter().find_map(|item| {
        let start = item.start.date_time?;
        let end = item.end.date_time?;
        if start <= now && now <= end {
            Some(Commitment {
                summary: item.summary.clone().unwrap_or_else(|| "Busy".to_string()),
                start,
                end,
                location: item.location.clone().filter(|l| !l.is_empty()),
            })
        } else {
            None
        }
    })
}
