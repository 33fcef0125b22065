//! Records that need manual remediation.

use crate::core::{IdempotencyKey, ObjectLocator, SeverityTier};
use crate::dispatch::ActionRecord;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A finding whose actions could not be completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// Unique id.
    pub id: Uuid,
    /// Finding the record belongs to.
    pub finding_id: String,
    /// Object the finding targets.
    pub object_locator: ObjectLocator,
    /// Tier the record was dispatched at.
    pub tier: SeverityTier,
    /// Dispatch attempts made.
    pub attempts: u32,
    /// Last failure.
    pub reason: String,
    /// Whether the failure was fatal rather than retries running out.
    pub fatal: bool,
    /// When the record was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Creates a dead letter for `record`.
    pub fn from_record(record: &ActionRecord, reason: impl Into<String>, fatal: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            finding_id: record.finding_id.clone(),
            object_locator: record.object_locator.clone(),
            tier: record.tier,
            attempts: record.attempts,
            reason: reason.into(),
            fatal,
            dead_lettered_at: Utc::now(),
        }
    }

    /// Key of the dead-lettered finding.
    pub fn key(&self) -> IdempotencyKey {
        IdempotencyKey::new(self.finding_id.clone(), self.object_locator.clone())
    }
}

/// Append-only list of dead letters.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterQueue {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl DeadLetterQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dead letter.
    pub fn push(&self, letter: DeadLetter) {
        self.letters
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(letter);
    }

    /// All dead letters, oldest first.
    pub fn list(&self) -> Vec<DeadLetter> {
        self.letters
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Dead letters for one finding delivery.
    pub fn for_key(&self, key: &IdempotencyKey) -> Vec<DeadLetter> {
        self.letters
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|l| &l.key() == key)
            .cloned()
            .collect()
    }

    /// Number of dead letters.
    pub fn len(&self) -> usize {
        self.letters.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Returns true if nothing was dead-lettered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
