//! Audit record types.

use crate::core::{ObjectLocator, SeverityTier};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Outcome recorded by an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action succeeded.
    Succeeded,
    /// The action failed.
    Failed,
    /// The action was not needed.
    Skipped,
    /// A redelivery returned an existing record without processing.
    ShortCircuited,
    /// The record was dead-lettered.
    DeadLettered,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::ShortCircuited => "short_circuited",
            Self::DeadLettered => "dead_lettered",
        };
        f.write_str(s)
    }
}

/// One immutable audit record per (finding, action, outcome).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Per-object sequence number, assigned by the logger.
    pub sequence: u64,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// Finding the record concerns.
    pub finding_id: String,
    /// Object the record concerns.
    pub object_locator: ObjectLocator,
    /// Action name (`quarantine`, `tag`, `dead_letter`, `alert_fallback`, ...).
    pub action: String,
    /// Outcome of the action.
    pub outcome: AuditOutcome,
    /// Tier in effect, if known.
    pub tier: Option<SeverityTier>,
    /// Free-form detail.
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Creates a record; sequence and timestamp are set when it is logged.
    pub fn new(
        finding_id: impl Into<String>,
        object_locator: ObjectLocator,
        action: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            timestamp: Utc::now(),
            finding_id: finding_id.into(),
            object_locator,
            action: action.into(),
            outcome,
            tier: None,
            detail: None,
        }
    }

    /// Sets the tier.
    pub fn with_tier(mut self, tier: SeverityTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Sets the detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
