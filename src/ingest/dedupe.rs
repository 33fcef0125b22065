//! Time-windowed deduplication of finding deliveries.

use crate::core::IdempotencyKey;
use crate::dispatch::ActionStatus;

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::Duration;

/// Result of offering a delivery to the dedupe window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First delivery in the window, or a resumable retry; process it.
    Admitted,
    /// Already known; the recorded status is returned without processing.
    Duplicate(ActionStatus),
}

/// Bounded, time-windowed record of processed idempotency keys.
///
/// Entries live for the window length after their last update. Keys older
/// than the window may be processed again; quarantine stays idempotent in
/// that case through the marker tag on the quarantine copy.
#[derive(Debug, Clone)]
pub struct DedupeWindow {
    entries: Cache<IdempotencyKey, ActionStatus>,
}

impl DedupeWindow {
    /// Creates a window holding up to `max_capacity` keys for `window`.
    pub fn new(max_capacity: u64, window: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(window)
                .build(),
        }
    }

    /// Atomically admits `key` unless it is known with a non-resumable status.
    ///
    /// Exactly one of several concurrent deliveries of the same key is admitted.
    pub async fn admit(&self, key: &IdempotencyKey) -> Admission {
        let result = self
            .entries
            .entry(key.clone())
            .and_compute_with(|existing| {
                let op = match existing.map(|e| e.into_value()) {
                    None | Some(ActionStatus::Failed) => Op::Put(ActionStatus::Dispatching),
                    Some(_) => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::Inserted(_) | CompResult::ReplacedWith(_) => Admission::Admitted,
            CompResult::Unchanged(entry) => Admission::Duplicate(entry.into_value()),
            CompResult::StillNone(_) | CompResult::Removed(_) => Admission::Admitted,
        }
    }

    /// Records the latest status of `key`.
    pub async fn record(&self, key: &IdempotencyKey, status: ActionStatus) {
        self.entries.insert(key.clone(), status).await;
    }

    /// Returns the recorded status of `key`, if it is inside the window.
    pub async fn status(&self, key: &IdempotencyKey) -> Option<ActionStatus> {
        self.entries.get(key).await
    }

    /// Forgets `key`, e.g. after a validation failure downstream.
    pub async fn forget(&self, key: &IdempotencyKey) {
        self.entries.invalidate(key).await;
    }
}
