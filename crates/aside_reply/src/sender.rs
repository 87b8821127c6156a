//! Outbound delivery through the native messaging app.

use aside_core::{DeliveryError, MessageSender};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Sends through the Messages app via `osascript`.
///
/// The body goes through a temp file read by the script, so arbitrary
/// text never has to be escaped into an AppleScript string literal. The
/// recipient still does; it is escaped conservatively.
pub struct OsaScriptSender {
    timeout: Duration,
}

impl OsaScriptSender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn script(recipient: &str, body_path: &str) -> String {
        format!(
            r#"tell application "Messages"
    set targetService to 1st account whose service type = iMessage
    set targetBuddy to participant "{}" of targetService
    set messageText to (read POSIX file "{}" as «class utf8»)
    send messageText to targetBuddy
end tell"#,
            escape_applescript(recipient),
            escape_applescript(body_path),
        )
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl MessageSender for OsaScriptSender {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), DeliveryError> {
        let mut body = tempfile::NamedTempFile::new()
            .map_err(|e| DeliveryError::Spawn(format!("temp file: {e}")))?;
        body.write_all(text.as_bytes())
            .map_err(|e| DeliveryError::Spawn(format!("temp file: {e}")))?;
        body.flush()
            .map_err(|e| DeliveryError::Spawn(format!("temp file: {e}")))?;

        let script = Self::script(recipient, &body.path().display().to_string());
        let mut command = tokio::process::Command::new("osascript");
        command.arg("-e").arg(&script).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(DeliveryError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(DeliveryError::Spawn(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            tracing::info!(recipient, "message handed to the messaging app");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(DeliveryError::Command(stderr))
        }
    }
}

/// Test double: records every delivery attempt and plays back scripted
/// failures, so tests can simulate success, failure and timeout
/// deterministically.
#[derive(Default)]
pub struct RecordingSender {
    attempts: Mutex<Vec<(String, String)>>,
    scripted_failures: Mutex<VecDeque<DeliveryError>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next delivery attempt. Attempts beyond the
    /// queued failures succeed.
    pub fn fail_next(&self, error: DeliveryError) {
        self.scripted_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Every attempt made so far, successful or not.
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), DeliveryError> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((recipient.to_string(), text.to_string()));
        match self
            .scripted_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
