//! Admin notifications through a Discord-style webhook.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::traits::BaseNotifier;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts text to a chat webhook as a code block.
///
/// Without a URL, or when disabled, messages are only written to the log.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
    disabled: bool,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>, disabled: bool) -> Result<Self> {
        Self::with_timeout(url, disabled, Duration::from_secs(30))
    }

    /// A notifier whose webhook calls give up after `timeout`.
    pub fn with_timeout(url: Option<String>, disabled: bool, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            disabled,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled && self.url.is_some()
    }
}

/// Wrap `text` in a code fence so the chat client keeps its layout.
fn fenced(text: &str) -> String {
    format!("```\n{}\n```", text.trim_end())
}

#[async_trait]
impl BaseNotifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = match (&self.url, self.disabled) {
            (Some(url), false) => url,
            _ => {
                tracing::info!(report = %text, "Webhook disabled, notification logged only");
                return Ok(());
            }
        };

        let content = fenced(text);
        let resp = self
            .client
            .post(url)
            .json(&WebhookPayload { content: &content })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("webhook returned {}: {}", status, body);
        }

        tracing::debug!("Webhook notification delivered");
        Ok(())
    }
}
