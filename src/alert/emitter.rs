//! Alert fan-out with retry and audit fallback.

use crate::alert::message::AlertMessage;
use crate::alert::sinks::{AlertSink, LogAlertSink};
use crate::audit::{AuditLogger, AuditOutcome, AuditRecord};
use crate::core::NotificationError;
use crate::dispatch::{retry_async, RetryConfig};

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// Action name of the audit record written when a channel gives up.
pub const ALERT_FALLBACK_ACTION: &str = "alert_fallback";

/// Per-channel delivery result of one alert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertReport {
    /// Channels that accepted the alert.
    pub delivered: Vec<String>,
    /// Channels that failed and were replaced by a fallback audit record.
    pub fell_back: Vec<String>,
}

impl AlertReport {
    /// Returns true if every channel accepted the alert.
    pub fn all_delivered(&self) -> bool {
        self.fell_back.is_empty()
    }
}

/// Sends alerts to named channels.
///
/// Delivery never fails the caller: each channel is retried with backoff and,
/// once exhausted, an `alert_fallback` audit record takes its place.
#[derive(Debug, Clone)]
pub struct AlertEmitter {
    channels: HashMap<String, Arc<dyn AlertSink>>,
    retry: RetryConfig,
    audit: AuditLogger,
}

impl AlertEmitter {
    /// Creates an emitter with the `log` channel registered.
    pub fn new(audit: AuditLogger) -> Self {
        Self {
            channels: HashMap::new(),
            retry: RetryConfig::default(),
            audit,
        }
        .with_channel("log", Arc::new(LogAlertSink::new()))
    }

    /// Registers (or replaces) a channel.
    pub fn with_channel(mut self, name: impl Into<String>, sink: Arc<dyn AlertSink>) -> Self {
        self.channels.insert(name.into(), sink);
        self
    }

    /// Sets the per-channel retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Names of registered channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sends `message` to every channel in `channels` concurrently.
    pub async fn emit(&self, message: &AlertMessage, channels: &[String]) -> AlertReport {
        self.emit_until(message, channels, None).await
    }

    /// Like [`emit`](Self::emit), but no send attempt runs past `deadline`;
    /// channels still pending then fall back like exhausted ones.
    pub async fn emit_until(
        &self,
        message: &AlertMessage,
        channels: &[String],
        deadline: Option<Instant>,
    ) -> AlertReport {
        let results = join_all(channels.iter().map(|channel| async move {
            (channel, self.deliver(channel, message, deadline).await)
        }))
        .await;

        let mut report = AlertReport::default();
        for (channel, result) in results {
            match result {
                Ok(()) => report.delivered.push(channel.clone()),
                Err(e) => {
                    self.fallback(channel, message, &e).await;
                    report.fell_back.push(channel.clone());
                }
            }
        }

        tracing::debug!(
            finding_id = %message.finding_id,
            delivered = report.delivered.len(),
            fell_back = report.fell_back.len(),
            "Alert emitted"
        );
        report
    }

    async fn deliver(
        &self,
        channel: &str,
        message: &AlertMessage,
        deadline: Option<Instant>,
    ) -> Result<(), NotificationError> {
        let sink = self
            .channels
            .get(channel)
            .ok_or_else(|| NotificationError::UnknownChannel {
                channel: channel.to_string(),
            })?;

        retry_async(
            &self.retry,
            &message.finding_id,
            deadline,
            NotificationError::is_retryable,
            || async move {
                let Some(deadline) = deadline else {
                    return sink.send(channel, message).await;
                };
                match tokio::time::timeout_at(deadline, sink.send(channel, message)).await {
                    Ok(result) => result,
                    Err(_) => Err(NotificationError::unreachable(
                        channel,
                        "execution budget exhausted before delivery",
                    )),
                }
            },
        )
        .await
    }

    async fn fallback(&self, channel: &str, message: &AlertMessage, error: &NotificationError) {
        tracing::warn!(
            channel = %channel,
            finding_id = %message.finding_id,
            object = %message.object_locator,
            error = %error,
            "Alert channel failed, writing fallback record"
        );

        let record = AuditRecord::new(
            message.finding_id.clone(),
            message.object_locator.clone(),
            ALERT_FALLBACK_ACTION,
            AuditOutcome::Failed,
        )
        .with_tier(message.severity)
        .with_detail(format!("channel '{}': {}; alert: {}", channel, error, message.summary));
        self.audit.log(record).await;
    }
}
