//! Action records and their lifecycle.

use crate::core::{IdempotencyKey, ObjectLocator, SeverityTier};
use crate::dispatch::action::ActionKind;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an [`ActionRecord`].
///
/// `New → Classified → Dispatching → Completed | Failed`. A failed record
/// resumes through `Dispatching` again, or ends as `DeadLettered` once its
/// retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    /// Record created, tier not yet known.
    New,
    /// Tier assigned and actions planned.
    Classified,
    /// Actions are executing.
    Dispatching,
    /// Every mandatory action succeeded.
    Completed,
    /// A mandatory action failed; the record can be resumed.
    Failed,
    /// Retries exhausted or a fatal error; needs manual remediation.
    DeadLettered,
}

impl ActionStatus {
    /// Returns true for statuses that never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::DeadLettered)
    }
}

/// Result of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Action that ran.
    pub action: ActionKind,
    /// Whether it succeeded.
    pub succeeded: bool,
    /// Extra context: skip reason, error message, quarantine location.
    pub detail: Option<String>,
    /// When it finished.
    pub at: DateTime<Utc>,
}

/// The dispatcher's record of one finding against one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Finding the record belongs to.
    pub finding_id: String,
    /// Object the actions target.
    pub object_locator: ObjectLocator,
    /// Tier the actions were planned for.
    pub tier: SeverityTier,
    /// Actions in execution order.
    pub actions_planned: Vec<ActionKind>,
    /// Actions that have run (successfully, or best-effort attempts).
    pub actions_completed: Vec<ActionKind>,
    /// Outcome of every execution attempt, in order.
    pub outcomes: Vec<ActionOutcome>,
    /// Current status.
    pub status: ActionStatus,
    /// Number of dispatch attempts.
    pub attempts: u32,
    /// Last mandatory failure, if any.
    pub last_error: Option<String>,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// When the record reached `Completed` or `DeadLettered`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ActionRecord {
    /// Creates a `New` record.
    pub fn new(key: &IdempotencyKey) -> Self {
        Self {
            finding_id: key.finding_id.clone(),
            object_locator: key.locator.clone(),
            tier: SeverityTier::Low,
            actions_planned: Vec::new(),
            actions_completed: Vec::new(),
            outcomes: Vec::new(),
            status: ActionStatus::New,
            attempts: 0,
            last_error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Returns the idempotency key of this record.
    pub fn key(&self) -> IdempotencyKey {
        IdempotencyKey::new(self.finding_id.clone(), self.object_locator.clone())
    }

    /// Moves `New → Classified` with the given plan.
    pub fn classify(&mut self, tier: SeverityTier, plan: Vec<ActionKind>) {
        if self.status == ActionStatus::New {
            self.tier = tier;
            self.actions_planned = plan;
            self.status = ActionStatus::Classified;
        }
    }

    /// Returns true if `action` already ran for this record.
    pub fn is_done(&self, action: ActionKind) -> bool {
        self.actions_completed.contains(&action)
    }

    /// Actions still to run, in order.
    pub fn pending_actions(&self) -> Vec<ActionKind> {
        self.actions_planned
            .iter()
            .copied()
            .filter(|a| !self.is_done(*a))
            .collect()
    }

    /// Records an outcome; successful or best-effort actions count as done.
    pub fn record_outcome(&mut self, action: ActionKind, succeeded: bool, detail: Option<String>) {
        if (succeeded || !action.is_mandatory()) && !self.is_done(action) {
            self.actions_completed.push(action);
        }
        self.outcomes.push(ActionOutcome {
            action,
            succeeded,
            detail,
            at: Utc::now(),
        });
    }

    /// Marks the record `Completed`.
    pub fn complete(&mut self) {
        self.status = ActionStatus::Completed;
        self.last_error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Marks the record `Failed` with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ActionStatus::Failed;
        self.last_error = Some(reason.into());
    }

    /// Marks the record `DeadLettered`.
    pub fn dead_letter(&mut self, reason: impl Into<String>) {
        self.status = ActionStatus::DeadLettered;
        self.last_error = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }
}
