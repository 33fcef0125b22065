//! Quarantine ledger entries.

use crate::core::{ObjectLocator, SeverityTier};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Review status of a quarantined object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    /// Awaiting human review.
    Pending,
    /// Reviewed as a false positive; the object was restored.
    Cleared,
    /// Reviewed and confirmed as containing PII.
    Confirmed,
    /// The review deadline passed without a decision.
    Expired,
}

impl ReviewStatus {
    /// Returns true while the object is expected to sit in quarantine.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Returns true if moving to `next` is a valid review transition.
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Cleared)
                | (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Expired)
        )
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Cleared => "CLEARED",
            Self::Confirmed => "CONFIRMED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// A quarantined object awaiting or past review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineEntry {
    /// Where the object lived before quarantine.
    pub original_locator: ObjectLocator,
    /// Where the quarantine copy lives.
    pub quarantine_locator: ObjectLocator,
    /// Finding that caused the quarantine.
    pub finding_id: String,
    /// Tier the object was quarantined at.
    pub severity: SeverityTier,
    /// When the copy was verified.
    pub quarantined_at: DateTime<Utc>,
    /// When an undecided review expires.
    pub review_deadline: DateTime<Utc>,
    /// Current review status.
    pub review_status: ReviewStatus,
    /// When the status last changed.
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl QuarantineEntry {
    /// Creates a `Pending` entry.
    pub fn new(
        original_locator: ObjectLocator,
        quarantine_locator: ObjectLocator,
        finding_id: impl Into<String>,
        severity: SeverityTier,
        quarantined_at: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            original_locator,
            quarantine_locator,
            finding_id: finding_id.into(),
            severity,
            quarantined_at,
            review_deadline: quarantined_at + retention,
            review_status: ReviewStatus::Pending,
            reviewed_at: None,
        }
    }

    /// Ledger id of this entry: the original locator.
    pub fn id(&self) -> String {
        self.original_locator.to_string()
    }

    /// Returns true if the entry is pending and its deadline is before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.review_status == ReviewStatus::Pending && self.review_deadline < now
    }
}

/// Filter for listing ledger entries.
#[derive(Debug, Clone, Default)]
pub struct QuarantineFilter {
    /// Only entries with this status.
    pub status: Option<ReviewStatus>,
    /// Only entries in this container.
    pub container: Option<String>,
    /// Only entries whose deadline is before this instant.
    pub deadline_before: Option<DateTime<Utc>>,
    /// Only entries quarantined after this instant.
    pub quarantined_after: Option<DateTime<Utc>>,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
    /// Entries to skip.
    pub offset: Option<usize>,
}

impl QuarantineFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by review status.
    pub fn with_status(mut self, status: ReviewStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by container.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Filters to entries whose deadline passed before `at`.
    pub fn with_deadline_before(mut self, at: DateTime<Utc>) -> Self {
        self.deadline_before = Some(at);
        self
    }

    /// Filters to entries quarantined after `at`.
    pub fn with_quarantined_after(mut self, at: DateTime<Utc>) -> Self {
        self.quarantined_after = Some(at);
        self
    }

    /// Sets pagination.
    pub fn with_pagination(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Returns true if `entry` matches every criterion.
    pub fn matches(&self, entry: &QuarantineEntry) -> bool {
        if let Some(status) = self.status {
            if entry.review_status != status {
                return false;
            }
        }
        if let Some(ref container) = self.container {
            if &entry.original_locator.container != container {
                return false;
            }
        }
        if let Some(before) = self.deadline_before {
            if entry.review_deadline >= before {
                return false;
            }
        }
        if let Some(after) = self.quarantined_after {
            if entry.quarantined_at < after {
                return false;
            }
        }
        true
    }

    /// Applies ordering (oldest first) and pagination to matching entries.
    pub fn apply<'a, I>(&self, entries: I) -> Vec<QuarantineEntry>
    where
        I: IntoIterator<Item = &'a QuarantineEntry>,
    {
        let mut matching: Vec<_> = entries
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.quarantined_at
                .cmp(&b.quarantined_at)
                .then_with(|| a.original_locator.cmp(&b.original_locator))
        });

        matching
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}
