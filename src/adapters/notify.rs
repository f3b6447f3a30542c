//! Best-effort chat notifications.
//!
//! Notification failures are logged by callers and never affect run
//! status.

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Conversation thread a run's messages are grouped under
#[derive(Debug, Clone, Default)]
pub struct ThreadContext {
    pub channel: Option<String>,
    pub thread_ts: Option<String>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &str, thread: &ThreadContext) -> Result<()>;
}

/// Sink posting to an incoming-webhook endpoint
pub struct WebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, message: &str, thread: &ThreadContext) -> Result<()> {
        let mut body = serde_json::json!({ "text": message });
        if let Some(channel) = &thread.channel {
            body["channel"] = serde_json::json!(channel);
        }
        if let Some(ts) = &thread.thread_ts {
            body["thread_ts"] = serde_json::json!(ts);
        }

        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("webhook notification failed")?
            .error_for_status()
            .context("webhook returned an error status")?;
        Ok(())
    }
}
