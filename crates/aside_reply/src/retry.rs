//! Retry with exponential backoff for outbound HTTP calls.
//!
//! Retries transient failures (429, 5xx, network timeouts); client
//! errors (400/401/403/404) fail immediately.

use anyhow::Result;
use reqwest::{Response, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Run `operation` until it yields a successful response, a
/// non-retryable status, or attempts run out.
pub async fn with_retry<F, Fut>(config: &RetryConfig, target: &str, operation: F) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Response>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    if attempt > 1 {
                        tracing::info!("{target} succeeded on attempt {attempt}");
                    }
                    return Ok(response);
                }
                let body = response.text().await.unwrap_or_default();
                if !is_retryable_status(status) {
                    anyhow::bail!("{target} API error ({status}): {body}");
                }
                tracing::warn!(
                    "{target} returned {status} on attempt {attempt}/{}: {}",
                    config.max_attempts,
                    body.chars().take(200).collect::<String>()
                );
                last_error = Some(format!("{target} ({status}): {body}"));
            }
            Err(e) => {
                tracing::warn!(
                    "{target} network error on attempt {attempt}/{}: {e}",
                    config.max_attempts
                );
                last_error = Some(format!("{target}: {e}"));
            }
        }

        if attempt < config.max_attempts {
            let sleep_time = delay + Duration::from_millis(clock_jitter());
            tracing::info!(
                "{target} retrying in {:.1}s (attempt {}/{})",
                sleep_time.as_secs_f64(),
                attempt + 1,
                config.max_attempts
            );
            tokio::time::sleep(sleep_time).await;
            delay = Duration::from_secs_f64(
                (delay.as_secs_f64() * config.backoff_factor).min(config.max_delay.as_secs_f64()),
            );
        }
    }

    anyhow::bail!(
        "all {} attempts against {target} failed, last error: {}",
        config.max_attempts,
        last_error.unwrap_or_else(|| "unknown".to_string())
    )
}

/// 0-500ms of jitter from the system clock's subsecond nanos.
fn clock_jitter() -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 500) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
