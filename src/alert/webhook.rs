//! HTTP webhook alert sink.
//!
//! Posts each [`AlertMessage`] as JSON. Requires the `webhook` feature.

use crate::alert::message::AlertMessage;
use crate::alert::sinks::AlertSink;
use crate::core::NotificationError;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Webhook configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint receiving the POST.
    pub url: String,
    /// Bearer token, if the endpoint requires one.
    pub token: Option<SecretString>,
    /// Request timeout.
    pub timeout: Duration,
}

impl WebhookConfig {
    /// Creates a configuration for `url` with a 10 second timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into().into()));
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Delivers alerts to an HTTP endpoint.
#[derive(Debug)]
pub struct WebhookAlertSink {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookAlertSink {
    /// Creates the sink.
    pub fn new(config: WebhookConfig) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                NotificationError::unreachable("webhook", format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, channel: &str, message: &AlertMessage) -> Result<(), NotificationError> {
        let mut request = self.client.post(&self.config.url).json(message);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::unreachable(channel, e.to_string()))?;

        match status_error(channel, response.status()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Maps a response status to a delivery error: 5xx and 429 are retryable,
/// other non-success codes reject the alert.
fn status_error(channel: &str, status: reqwest::StatusCode) -> Option<NotificationError> {
    if status.is_success() {
        return None;
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Some(NotificationError::unreachable(
            channel,
            format!("endpoint returned {}", status),
        ));
    }
    Some(NotificationError::Rejected {
        channel: channel.to_string(),
        status: status.as_u16(),
    })
}
