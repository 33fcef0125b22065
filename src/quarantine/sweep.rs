//! Review deadline sweep.

use crate::alert::{AlertEmitter, AlertMessage};
use crate::audit::{AuditLogger, AuditOutcome, AuditRecord};
use crate::config::{Config, ExpiryAction};
use crate::core::{ObjectLocator, ResponseResult};
use crate::quarantine::entry::{QuarantineEntry, ReviewStatus};
use crate::quarantine::manager::QuarantineManager;

use chrono::{DateTime, Utc};

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Entries moved to `Expired`.
    pub expired: Vec<ObjectLocator>,
    /// Quarantine copies deleted under `auto-delete`.
    pub purged: usize,
    /// Entries escalated under `escalate`.
    pub escalated: usize,
    /// Entries whose expiry failed, with the error.
    pub failures: Vec<(ObjectLocator, String)>,
}

/// Expires pending quarantine entries past their review deadline.
///
/// Meant to be run periodically by an external scheduler.
#[derive(Debug, Clone)]
pub struct ReviewSweeper {
    manager: QuarantineManager,
    alerts: AlertEmitter,
    audit: AuditLogger,
}

impl ReviewSweeper {
    /// Creates a sweeper.
    pub fn new(manager: QuarantineManager, alerts: AlertEmitter, audit: AuditLogger) -> Self {
        Self {
            manager,
            alerts,
            audit,
        }
    }

    /// Expires every pending entry whose deadline is before `now` and runs
    /// the configured expiry action on it.
    pub async fn sweep(&self, now: DateTime<Utc>, config: &Config) -> ResponseResult<SweepReport> {
        let overdue = self.manager.ledger().overdue(now).await?;
        let mut report = SweepReport::default();

        for entry in overdue {
            match self.expire(&entry, now, config).await {
                Ok(()) => {
                    report.expired.push(entry.original_locator.clone());
                    match config.expiry_action {
                        ExpiryAction::AutoDelete => report.purged += 1,
                        ExpiryAction::Escalate => report.escalated += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!(object = %entry.original_locator, error = %e, "Failed to expire quarantine entry");
                    report
                        .failures
                        .push((entry.original_locator.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            expired = report.expired.len(),
            failures = report.failures.len(),
            "Review sweep finished"
        );
        Ok(report)
    }

    async fn expire(
        &self,
        entry: &QuarantineEntry,
        now: DateTime<Utc>,
        config: &Config,
    ) -> ResponseResult<()> {
        // purge before marking, so a failed delete leaves the entry pending for the next sweep
        if config.expiry_action == ExpiryAction::AutoDelete {
            self.manager.purge(entry).await?;
        }

        self.manager
            .ledger()
            .update_status(&entry.original_locator, ReviewStatus::Expired, now)
            .await?;

        let action = match config.expiry_action {
            ExpiryAction::AutoDelete => "review_expired_purged",
            ExpiryAction::Escalate => "review_expired_escalated",
        };
        self.audit
            .log(
                AuditRecord::new(
                    entry.finding_id.clone(),
                    entry.original_locator.clone(),
                    action,
                    AuditOutcome::Succeeded,
                )
                .with_tier(entry.severity)
                .with_detail(format!("review deadline {} passed", entry.review_deadline)),
            )
            .await;

        if config.expiry_action == ExpiryAction::Escalate {
            let message = AlertMessage::new(
                entry.severity,
                entry.finding_id.clone(),
                entry.original_locator.clone(),
                format!(
                    "quarantined object {} was not reviewed before {}",
                    entry.quarantine_locator, entry.review_deadline
                ),
            );
            self.alerts.emit(&message, &config.alert_channels).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemoryAlertSink;
    use crate::audit::MemoryAuditSink;
    use crate::core::SeverityTier;
    use crate::quarantine::ledger::{InMemoryLedger, QuarantineLedger};
    use crate::quarantine::memory::InMemoryObjectStore;
    use crate::quarantine::store::StoredObject;
    use chrono::Duration;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryObjectStore>,
        ledger: Arc<InMemoryLedger>,
        pager: Arc<MemoryAlertSink>,
        audit_sink: Arc<MemoryAuditSink>,
        sweeper: ReviewSweeper,
    }

    async fn fixture(config: &Config) -> Fixture {
        let original = ObjectLocator::new("media", "a.csv");
        let store = Arc::new(
            InMemoryObjectStore::new().with_object(original.clone(), StoredObject::new("ssn")),
        );
        let ledger = Arc::new(InMemoryLedger::new());
        let manager = QuarantineManager::new(store.clone(), ledger.clone());
        manager
            .quarantine("f-1", &original, SeverityTier::High, config)
            .await
            .unwrap();

        let audit_sink = Arc::new(MemoryAuditSink::new());
        let audit = AuditLogger::new().with_sink(audit_sink.clone());
        let pager = Arc::new(MemoryAlertSink::new());
        let alerts = AlertEmitter::new(audit.clone()).with_channel("pager", pager.clone());

        Fixture {
            store,
            ledger,
            pager,
            audit_sink,
            sweeper: ReviewSweeper::new(manager, alerts, audit),
        }
    }

    #[tokio::test]
    async fn test_nothing_overdue() {
        let config = Config::default();
        let fx = fixture(&config).await;
        let report = fx.sweeper.sweep(Utc::now(), &config).await.unwrap();
        assert!(report.expired.is_empty());
    }

    #[tokio::test]
    async fn test_escalate_on_expiry() {
        let mut config = Config::default();
        config.expiry_action = ExpiryAction::Escalate;
        config.alert_channels = vec!["pager".into()];
        let fx = fixture(&config).await;

        let later = Utc::now() + Duration::days(91);
        let report = fx.sweeper.sweep(later, &config).await.unwrap();

        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.escalated, 1);
        assert_eq!(fx.pager.sent().len(), 1);
        assert_eq!(
            fx.audit_sink.records_for_action("review_expired_escalated").len(),
            1
        );
        let entry = fx
            .ledger
            .get(&ObjectLocator::new("media", "a.csv"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.review_status, ReviewStatus::Expired);
        assert!(fx.store.contains(&ObjectLocator::new("media", "quarantine/a.csv")));

        let again = fx.sweeper.sweep(later, &config).await.unwrap();
        assert!(again.expired.is_empty());
    }

    #[tokio::test]
    async fn test_auto_delete_on_expiry() {
        let mut config = Config::default();
        config.expiry_action = ExpiryAction::AutoDelete;
        let fx = fixture(&config).await;

        let report = fx
            .sweeper
            .sweep(Utc::now() + Duration::days(91), &config)
            .await
            .unwrap();

        assert_eq!(report.purged, 1);
        assert!(!fx.store.contains(&ObjectLocator::new("media", "quarantine/a.csv")));
        assert!(fx.pager.sent().is_empty());
    }
}
