//! Invocation results returned to event-source callers.

use crate::classify::Assessment;
use crate::dispatch::{ActionRecord, ActionStatus};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Result of processing one finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// The action record after processing.
    pub record: ActionRecord,
    /// Classification, absent for short-circuited redeliveries.
    pub assessment: Option<Assessment>,
    /// True if the delivery was a duplicate and nothing ran.
    pub short_circuited: bool,
}

impl ProcessOutcome {
    /// Final status of the record.
    pub fn status(&self) -> ActionStatus {
        self.record.status
    }

    pub(crate) fn summary(&self) -> Value {
        serde_json::json!({
            "findingId": self.record.finding_id,
            "objectLocator": self.record.object_locator,
            "tier": self.record.tier,
            "status": self.record.status,
            "actionsCompleted": self.record.actions_completed,
            "shortCircuited": self.short_circuited,
        })
    }
}

/// Body of a [`HandlerResponse`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerBody {
    /// Success message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-finding results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
}

/// Response of [`ResponseEngine::handle_event`](crate::engine::ResponseEngine::handle_event).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    /// 200 on success, 400 for rejected payloads, 500 for processing failures.
    pub status_code: u16,
    /// Response body.
    pub body: HandlerBody,
}

impl HandlerResponse {
    pub(crate) fn ok(message: impl Into<String>, result: Value) -> Self {
        Self {
            status_code: 200,
            body: HandlerBody {
                message: Some(message.into()),
                error: None,
                result: Some(result),
                timestamp: Utc::now(),
            },
        }
    }

    pub(crate) fn rejected(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(400, error, message)
    }

    pub(crate) fn failed(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(500, error, message)
    }

    fn failure(status_code: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: HandlerBody {
                message: Some(message.into()),
                error: Some(error.into()),
                result: None,
                timestamp: Utc::now(),
            },
        }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
