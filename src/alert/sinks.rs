//! Alert sinks.

use crate::alert::message::AlertMessage;
use crate::core::NotificationError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// A channel alerts can be delivered to.
#[async_trait]
pub trait AlertSink: Send + Sync + Debug {
    /// Delivers one alert.
    async fn send(&self, channel: &str, message: &AlertMessage) -> Result<(), NotificationError>;
}

/// Writes alerts to the log at warn level.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl LogAlertSink {
    /// Creates the sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, channel: &str, message: &AlertMessage) -> Result<(), NotificationError> {
        tracing::warn!(
            channel = %channel,
            severity = %message.severity,
            finding_id = %message.finding_id,
            object = %message.object_locator,
            "ALERT: {}",
            message.summary
        );
        Ok(())
    }
}

/// Keeps alerts in memory, optionally slow or failing on demand.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    sent: RwLock<Vec<AlertMessage>>,
    failures: AtomicU32,
    latency: Option<Duration>,
}

impl MemoryAlertSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every delivery by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next `times` deliveries fail as unreachable.
    pub fn fail_next(&self, times: u32) {
        self.failures.store(times, Ordering::SeqCst);
    }

    /// Alerts delivered so far.
    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn send(&self, channel: &str, message: &AlertMessage) -> Result<(), NotificationError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotificationError::unreachable(channel, "injected failure"));
        }
        self.sent
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(message.clone());
        Ok(())
    }
}
