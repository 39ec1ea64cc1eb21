use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use issuebot_core::config::AppConfig;
use issuebot_core::ApplicationError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

const MAX_ERROR_BODY_CHARS: usize = 240;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<WebhookError> for ApplicationError {
    fn from(value: WebhookError) -> Self {
        Self::Integration(value.to_string())
    }
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), WebhookError>;
}

/// Posts `{"text": ...}` to a Slack incoming webhook URL.
pub struct IncomingWebhookClient {
    client: Client,
    url: SecretString,
}

impl IncomingWebhookClient {
    pub fn new(client: Client, url: SecretString) -> Self {
        Self { client, url }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, WebhookError> {
        let timeout = Duration::from_secs(config.store.timeout_secs.max(1));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, config.slack.webhook_url.clone()))
    }
}

#[async_trait]
impl WebhookSender for IncomingWebhookClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), WebhookError> {
        let response = self.client.post(self.url.expose_secret()).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        debug!(event_name = "slack.webhook.sent", chars = message.text.len(), "webhook accepted");
        Ok(())
    }
}

/// Records messages instead of sending them. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryWebhook {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl MemoryWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// While set, every send is rejected with a 500 and nothing is recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl WebhookSender for MemoryWebhook {
    async fn send(&self, message: &OutboundMessage) -> Result<(), WebhookError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WebhookError::Rejected { status: 500, body: "simulated failure".into() });
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
