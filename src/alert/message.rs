//! Alert message.

use crate::core::{ObjectLocator, SeverityTier};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification sent to alert channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    /// Tier that triggered the alert.
    pub severity: SeverityTier,
    /// Finding behind the alert.
    pub finding_id: String,
    /// Object concerned.
    pub object_locator: ObjectLocator,
    /// Human-readable summary.
    pub summary: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
}

impl AlertMessage {
    /// Creates a message stamped with the current time.
    pub fn new(
        severity: SeverityTier,
        finding_id: impl Into<String>,
        object_locator: ObjectLocator,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            finding_id: finding_id.into(),
            object_locator,
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }
}
