//! Validation and deduplication of incoming finding events.
//!
//! [`EventIngester`] turns raw payloads into validated [`Finding`]s and
//! decides, per idempotency key, whether a delivery must be processed or
//! short-circuited as a redelivery.

mod dedupe;
mod validate;

pub use dedupe::{Admission, DedupeWindow};
pub use validate::{parse_payload, validate_payload, ENVELOPE_SOURCE};

use crate::core::{Finding, IdempotencyKey, ValidationError};
use crate::dispatch::ActionStatus;

use serde_json::Value;
use std::time::Duration;

/// Validates and deduplicates finding events.
#[derive(Debug, Clone)]
pub struct EventIngester {
    window: DedupeWindow,
}

impl EventIngester {
    /// Creates an ingester with the given dedupe capacity and window length.
    pub fn new(max_capacity: u64, window: Duration) -> Self {
        Self {
            window: DedupeWindow::new(max_capacity, window),
        }
    }

    /// Validates a JSON payload into one or more findings.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for missing or malformed fields; such
    /// payloads are discarded and never retried.
    pub fn validate(&self, payload: &Value) -> Result<Vec<Finding>, ValidationError> {
        validate_payload(payload).map_err(|e| {
            tracing::warn!(error = %e, "Discarding invalid finding payload");
            e
        })
    }

    /// Offers a validated finding to the dedupe window.
    pub async fn admit(&self, finding: &Finding) -> Admission {
        let key = finding.idempotency_key();
        let admission = self.window.admit(&key).await;
        if let Admission::Duplicate(status) = admission {
            tracing::info!(
                finding_id = %finding.id,
                object = %finding.object_locator,
                status = ?status,
                "Duplicate delivery short-circuited"
            );
        }
        admission
    }

    /// Records the status a delivery ended with.
    pub async fn record_status(&self, key: &IdempotencyKey, status: ActionStatus) {
        self.window.record(key, status).await;
    }

    /// Returns the recorded status for a key inside the window.
    pub async fn status(&self, key: &IdempotencyKey) -> Option<ActionStatus> {
        self.window.status(key).await
    }
}
