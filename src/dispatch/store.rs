//! Concurrent store of action records.

use crate::core::{IdempotencyKey, SeverityTier};
use crate::dispatch::action::ActionKind;
use crate::dispatch::record::{ActionRecord, ActionStatus};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Result of claiming a record for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller owns the record and must execute its pending actions.
    Run(ActionRecord),
    /// Another dispatch is executing this record; snapshot returned.
    InFlight(ActionRecord),
    /// The record is terminal; returned unchanged.
    Terminal(ActionRecord),
}

/// Action records keyed by idempotency key.
///
/// Live records (new, dispatching, failed) are held until they turn
/// terminal. Terminal records move to a bounded cache and expire after the
/// retention period, after which a redelivery starts a fresh record.
#[derive(Debug, Clone)]
pub struct RecordStore {
    live: Arc<DashMap<IdempotencyKey, ActionRecord>>,
    terminal: Cache<IdempotencyKey, ActionRecord>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::with_retention(100_000, Duration::from_secs(24 * 60 * 60))
    }
}

impl RecordStore {
    /// Creates an empty store keeping up to 100 000 terminal records for a day.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store keeping up to `capacity` terminal records for `retention`.
    pub fn with_retention(capacity: u64, retention: Duration) -> Self {
        Self {
            live: Arc::new(DashMap::new()),
            terminal: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(retention)
                .build(),
        }
    }

    /// Atomically claims the record for `key`, creating or resuming it.
    ///
    /// A resumed record whose tier rose since the last attempt adopts the
    /// higher tier and appends the new plan's missing actions.
    pub fn claim(&self, key: &IdempotencyKey, tier: SeverityTier, plan: &[ActionKind]) -> Claim {
        match self.live.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                // terminal records enter the cache before leaving the live map
                if let Some(record) = self.terminal.get(key) {
                    return Claim::Terminal(record);
                }
                let mut record = ActionRecord::new(key);
                record.classify(tier, plan.to_vec());
                record.status = ActionStatus::Dispatching;
                record.attempts = 1;
                vacant.insert(record.clone());
                Claim::Run(record)
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                match record.status {
                    ActionStatus::Completed | ActionStatus::DeadLettered => {
                        Claim::Terminal(record.clone())
                    }
                    ActionStatus::Dispatching => Claim::InFlight(record.clone()),
                    ActionStatus::New | ActionStatus::Classified | ActionStatus::Failed => {
                        if record.status == ActionStatus::New {
                            record.classify(tier, plan.to_vec());
                        } else if tier > record.tier {
                            record.tier = tier;
                            let mut merged = plan.to_vec();
                            for action in &record.actions_planned {
                                if !merged.contains(action) {
                                    merged.push(*action);
                                }
                            }
                            record.actions_planned = merged;
                        }
                        record.status = ActionStatus::Dispatching;
                        record.attempts += 1;
                        Claim::Run(record.clone())
                    }
                }
            }
        }
    }

    /// Replaces the stored copy of a record.
    pub fn update(&self, record: &ActionRecord) {
        let key = record.key();
        if record.status.is_terminal() {
            self.live.insert(key.clone(), record.clone());
            self.terminal.insert(key.clone(), record.clone());
            self.live.remove(&key);
        } else {
            self.live.insert(key, record.clone());
        }
    }

    /// Returns the record for `key`.
    pub fn get(&self, key: &IdempotencyKey) -> Option<ActionRecord> {
        self.live
            .get(key)
            .map(|r| r.value().clone())
            .or_else(|| self.terminal.get(key))
    }

    /// Dead-letters a non-terminal record.
    pub fn dead_letter(&self, key: &IdempotencyKey, reason: &str) -> Option<ActionRecord> {
        let record = {
            let Some(mut live) = self.live.get_mut(key) else {
                return self.terminal.get(key);
            };
            if !live.status.is_terminal() {
                live.dead_letter(reason);
            }
            live.clone()
        };
        self.update(&record);
        Some(record)
    }

    /// All records with `status`.
    pub fn with_status(&self, status: ActionStatus) -> Vec<ActionRecord> {
        if status.is_terminal() {
            self.terminal
                .iter()
                .filter(|(_, r)| r.status == status)
                .map(|(_, r)| r)
                .collect()
        } else {
            self.live
                .iter()
                .filter(|r| r.status == status)
                .map(|r| r.value().clone())
                .collect()
        }
    }

    /// Number of records held, live and terminal.
    pub fn len(&self) -> usize {
        self.terminal.run_pending_tasks();
        self.live.len() + self.terminal.entry_count() as usize
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectLocator;

    fn key() -> IdempotencyKey {
        IdempotencyKey::new("f-1", ObjectLocator::new("media", "a.csv"))
    }

    #[test]
    fn test_claim_new_record() {
        let store = RecordStore::new();
        let plan = ActionKind::default_plan(SeverityTier::Medium);

        let Claim::Run(record) = store.claim(&key(), SeverityTier::Medium, &plan) else {
            panic!("expected to run");
        };
        assert_eq!(record.status, ActionStatus::Dispatching);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.actions_planned, plan);
    }

    #[test]
    fn test_second_claim_is_in_flight() {
        let store = RecordStore::new();
        let plan = ActionKind::default_plan(SeverityTier::Low);
        store.claim(&key(), SeverityTier::Low, &plan);
        assert!(matches!(
            store.claim(&key(), SeverityTier::Low, &plan),
            Claim::InFlight(_)
        ));
    }

    #[test]
    fn test_failed_record_resumes_with_upgrade() {
        let store = RecordStore::new();
        let medium = ActionKind::default_plan(SeverityTier::Medium);
        let Claim::Run(mut record) = store.claim(&key(), SeverityTier::Medium, &medium) else {
            panic!("expected to run");
        };
        record.fail("tag failed");
        store.update(&record);

        let high = ActionKind::default_plan(SeverityTier::High);
        let Claim::Run(record) = store.claim(&key(), SeverityTier::High, &high) else {
            panic!("expected to run");
        };
        assert_eq!(record.tier, SeverityTier::High);
        assert_eq!(record.actions_planned, high);
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_terminal_records_are_immutable() {
        let store = RecordStore::new();
        let plan = ActionKind::default_plan(SeverityTier::Low);
        let Claim::Run(mut record) = store.claim(&key(), SeverityTier::Low, &plan) else {
            panic!("expected to run");
        };
        record.complete();
        store.update(&record);

        assert!(matches!(
            store.claim(&key(), SeverityTier::Critical, &plan),
            Claim::Terminal(r) if r.tier == SeverityTier::Low
        ));
        let after = store.dead_letter(&key(), "late").unwrap();
        assert_eq!(after.status, ActionStatus::Completed);
    }

    #[test]
    fn test_terminal_records_expire() {
        let store = RecordStore::with_retention(100, Duration::from_millis(50));
        let plan = ActionKind::default_plan(SeverityTier::Low);
        let Claim::Run(mut record) = store.claim(&key(), SeverityTier::Low, &plan) else {
            panic!("expected to run");
        };
        record.complete();
        store.update(&record);
        assert_eq!(store.len(), 1);
        assert_eq!(store.with_status(ActionStatus::Completed).len(), 1);

        std::thread::sleep(Duration::from_millis(150));
        assert!(store.get(&key()).is_none());
        assert_eq!(store.len(), 0);
        assert!(matches!(
            store.claim(&key(), SeverityTier::Low, &plan),
            Claim::Run(r) if r.attempts == 1
        ));
    }
}
