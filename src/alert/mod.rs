//! Alerting for high-severity outcomes.

mod emitter;
mod message;
mod sinks;
#[cfg(feature = "webhook")]
mod webhook;

pub use emitter::{AlertEmitter, AlertReport, ALERT_FALLBACK_ACTION};
pub use message::AlertMessage;
pub use sinks::{AlertSink, LogAlertSink, MemoryAlertSink};
#[cfg(feature = "webhook")]
pub use webhook::{WebhookAlertSink, WebhookConfig};
