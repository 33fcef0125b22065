//! The validated finding produced by the ingester.

use crate::core::types::{IdempotencyKey, ObjectLocator, SeverityTier};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A report of suspected sensitive content in a stored object.
///
/// Findings are immutable once validated. The same logical detection may be
/// delivered more than once; [`Finding::idempotency_key`] identifies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Identifier assigned by the classification service.
    pub id: String,

    /// Object the finding targets.
    pub object_locator: ObjectLocator,

    /// Kind of sensitive data detected (e.g. `ssn`, `email`).
    pub finding_type: String,

    /// Classifier confidence in `[0, 1]`.
    pub confidence_score: f64,

    /// Number of occurrences of the sensitive data in the object.
    pub occurrence_count: u32,

    /// When the classification service produced the finding.
    pub detected_at: DateTime<Utc>,

    /// Severity suggested by the classification service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_hint: Option<SeverityTier>,
}

impl Finding {
    /// Creates a finding detected now with an occurrence count of one.
    pub fn new(
        id: impl Into<String>,
        object_locator: ObjectLocator,
        finding_type: impl Into<String>,
        confidence_score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            object_locator,
            finding_type: finding_type.into(),
            confidence_score,
            occurrence_count: 1,
            detected_at: Utc::now(),
            severity_hint: None,
        }
    }

    /// Sets the occurrence count.
    pub fn with_occurrence_count(mut self, count: u32) -> Self {
        self.occurrence_count = count;
        self
    }

    /// Sets the detection timestamp.
    pub fn with_detected_at(mut self, at: DateTime<Utc>) -> Self {
        self.detected_at = at;
        self
    }

    /// Sets the severity hint.
    pub fn with_severity_hint(mut self, hint: SeverityTier) -> Self {
        self.severity_hint = Some(hint);
        self
    }

    /// Returns the key that deduplicates deliveries of this finding.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::new(self.id.clone(), self.object_locator.clone())
    }
}
