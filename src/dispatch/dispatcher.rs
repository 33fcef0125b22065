//! Executes the action plan of a classified finding.

use crate::alert::{AlertEmitter, AlertMessage};
use crate::audit::{AuditLogger, AuditOutcome, AuditRecord};
use crate::config::Config;
use crate::core::{
    Finding, NotificationError, ObjectLocator, ResponseError, ResponseResult, SeverityTier,
};
use crate::dispatch::action::ActionKind;
use crate::dispatch::record::ActionRecord;
use crate::dispatch::store::{Claim, RecordStore};
use crate::quarantine::{QuarantineManager, Tags, MARKER_TAG};

use std::time::Duration;
use tokio::time::Instant;

/// Tag set on every object with a PII finding.
pub const PII_DETECTED_TAG: &str = "pii-detected";
/// Tag holding the highest tier seen for the object.
pub const PII_SEVERITY_TAG: &str = "pii-severity";
/// Tag holding the detection date, `YYYY-MM-DD`.
pub const PII_DETECTION_DATE_TAG: &str = "pii-detection-date";
/// Tag holding `flagged` or `quarantined`.
pub const SECURITY_STATUS_TAG: &str = "security-status";

/// Result of one dispatch call.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Record after the call.
    pub record: ActionRecord,
    /// Error of the mandatory action that failed the record, if any.
    pub error: Option<ResponseError>,
    /// False if the record was returned without executing anything.
    pub executed: bool,
}

/// Runs action plans against the object store, alert channels and audit log.
///
/// Actions run in plan order. A failed mandatory action marks the record
/// `Failed` and stops; best-effort failures are recorded and skipped.
/// Each dispatch runs under an execution budget: a mandatory action still
/// running when it expires fails with `BudgetExceeded`, and alert delivery
/// gets whatever remains of it.
/// Records are claimed atomically, so concurrent dispatches of the same
/// finding never execute twice.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    quarantine: QuarantineManager,
    alerts: AlertEmitter,
    audit: AuditLogger,
    records: RecordStore,
}

impl ActionDispatcher {
    /// Creates a dispatcher.
    pub fn new(
        quarantine: QuarantineManager,
        alerts: AlertEmitter,
        audit: AuditLogger,
        records: RecordStore,
    ) -> Self {
        Self {
            quarantine,
            alerts,
            audit,
            records,
        }
    }

    /// The record store.
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Dispatches `finding` at `tier` within `budget`.
    ///
    /// Terminal and in-flight records are returned as they are. A failed
    /// record resumes from its first incomplete action.
    pub async fn dispatch(
        &self,
        finding: &Finding,
        tier: SeverityTier,
        config: &Config,
        budget: Duration,
    ) -> DispatchOutcome {
        let key = finding.idempotency_key();
        let plan = config.actions_for(tier);

        let mut record = match self.records.claim(&key, tier, &plan) {
            Claim::Run(record) => record,
            Claim::InFlight(record) | Claim::Terminal(record) => {
                tracing::debug!(
                    finding_id = %finding.id,
                    status = ?record.status,
                    "Record not claimable, returning snapshot"
                );
                return DispatchOutcome {
                    record,
                    error: None,
                    executed: false,
                };
            }
        };

        tracing::info!(
            finding_id = %finding.id,
            object = %finding.object_locator,
            tier = %record.tier,
            attempt = record.attempts,
            pending = ?record.pending_actions(),
            "Dispatching actions"
        );

        let deadline = Instant::now() + budget;
        for action in record.pending_actions() {
            let execution = self.execute(action, finding, &record, config, deadline);
            // alert delivery bounds itself so its fallback records are still written
            let result = if action == ActionKind::Alert {
                execution.await
            } else {
                tokio::time::timeout_at(deadline, execution)
                    .await
                    .unwrap_or_else(|_| Err(ResponseError::BudgetExceeded { budget }))
            };
            match result {
                Ok(detail) => {
                    record.record_outcome(action, true, detail.clone());
                    self.audit_action(&record, action, AuditOutcome::Succeeded, detail)
                        .await;
                }
                Err(e) => {
                    let message = e.to_string();
                    record.record_outcome(action, false, Some(message.clone()));
                    self.audit_action(&record, action, AuditOutcome::Failed, Some(message.clone()))
                        .await;

                    if action.is_mandatory() {
                        tracing::warn!(
                            finding_id = %finding.id,
                            action = action.as_str(),
                            error = %e,
                            retryable = e.is_retryable(),
                            "Mandatory action failed"
                        );
                        record.fail(message);
                        self.records.update(&record);
                        return DispatchOutcome {
                            record,
                            error: Some(e),
                            executed: true,
                        };
                    }
                    tracing::warn!(
                        finding_id = %finding.id,
                        action = action.as_str(),
                        error = %e,
                        "Best-effort action failed"
                    );
                }
            }
            self.records.update(&record);
        }

        record.complete();
        self.records.update(&record);
        tracing::info!(
            finding_id = %finding.id,
            object = %finding.object_locator,
            tier = %record.tier,
            "Actions completed"
        );

        DispatchOutcome {
            record,
            error: None,
            executed: true,
        }
    }

    /// Where tags and access changes land: the quarantine copy when the plan
    /// quarantines, otherwise wherever the object lives now.
    async fn target(
        &self,
        finding: &Finding,
        record: &ActionRecord,
        config: &Config,
    ) -> ResponseResult<ObjectLocator> {
        let locator = &finding.object_locator;
        if locator.is_under(&config.quarantine_prefix) {
            return Ok(locator.clone());
        }
        if record.actions_planned.contains(&ActionKind::Quarantine) {
            return Ok(locator.under_prefix(&config.quarantine_prefix));
        }
        self.quarantine.locate(locator, config).await
    }

    async fn execute(
        &self,
        action: ActionKind,
        finding: &Finding,
        record: &ActionRecord,
        config: &Config,
        deadline: Instant,
    ) -> ResponseResult<Option<String>> {
        match action {
            ActionKind::Quarantine => {
                if finding.object_locator.is_under(&config.quarantine_prefix) {
                    return Ok(Some("object already in quarantine namespace".into()));
                }
                let outcome = self
                    .quarantine
                    .quarantine(&finding.id, &finding.object_locator, record.tier, config)
                    .await?;
                Ok(Some(format!(
                    "quarantined to {}",
                    outcome.entry.quarantine_locator
                )))
            }
            ActionKind::RestrictAccess => {
                let target = self.target(finding, record, config).await?;
                self.quarantine.restrict_access(&target).await?;
                Ok(Some(format!("{} set private", target)))
            }
            ActionKind::Tag => {
                let mut target = self.target(finding, record, config).await?;
                match self.tag(&target, finding, record).await {
                    // moved into quarantine by a concurrent finding since the lookup
                    Err(ResponseError::ObjectMissing { .. })
                        if target == finding.object_locator =>
                    {
                        target = self.quarantine.locate(&target, config).await?;
                        self.tag(&target, finding, record).await?;
                    }
                    result => result?,
                }
                Ok(Some(format!("tagged {}", target)))
            }
            ActionKind::Alert => self.alert(finding, record, config, deadline).await,
            ActionKind::Log => Ok(Some(format!(
                "type={} confidence={:.2} tier={} plan=[{}]",
                finding.finding_type,
                finding.confidence_score,
                record.tier,
                record
                    .actions_planned
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            ))),
        }
    }

    async fn alert(
        &self,
        finding: &Finding,
        record: &ActionRecord,
        config: &Config,
        deadline: Instant,
    ) -> ResponseResult<Option<String>> {
        let message = AlertMessage::new(
            record.tier,
            finding.id.clone(),
            finding.object_locator.clone(),
            format!(
                "{} finding '{}' ({} occurrence(s), confidence {:.2}) in {}",
                record.tier,
                finding.finding_type,
                finding.occurrence_count,
                finding.confidence_score,
                finding.object_locator
            ),
        );
        let report = self
            .alerts
            .emit_until(&message, &config.alert_channels, Some(deadline))
            .await;
        if report.all_delivered() {
            Ok(Some(format!("delivered to {}", report.delivered.join(","))))
        } else {
            Err(ResponseError::Notification(NotificationError::unreachable(
                report.fell_back.join(","),
                "delivery exhausted, fallback recorded",
            )))
        }
    }

    async fn tag(
        &self,
        target: &ObjectLocator,
        finding: &Finding,
        record: &ActionRecord,
    ) -> ResponseResult<()> {
        let store = self.quarantine.store();
        let existing = store
            .get_tags(target)
            .await
            .map_err(|e| ResponseError::from_store(e, target))?;

        let tags = merge_tags(existing, finding, record);
        store
            .put_tags(target, tags)
            .await
            .map_err(|e| ResponseError::from_store(e, target))
    }

    async fn audit_action(
        &self,
        record: &ActionRecord,
        action: ActionKind,
        outcome: AuditOutcome,
        detail: Option<String>,
    ) {
        let mut entry = AuditRecord::new(
            record.finding_id.clone(),
            record.object_locator.clone(),
            action.as_str(),
            outcome,
        )
        .with_tier(record.tier);
        if let Some(detail) = detail {
            entry = entry.with_detail(detail);
        }
        self.audit.log(entry).await;
    }
}

/// Merges the PII tags into `existing`, never lowering `pii-severity` or
/// moving `security-status` back from `quarantined`.
fn merge_tags(mut tags: Tags, finding: &Finding, record: &ActionRecord) -> Tags {
    let severity = tags
        .get(PII_SEVERITY_TAG)
        .and_then(|s| s.parse::<SeverityTier>().ok())
        .map_or(record.tier, |existing| existing.max(record.tier));

    let quarantined = record.actions_planned.contains(&ActionKind::Quarantine)
        || tags.get(SECURITY_STATUS_TAG).map(String::as_str) == Some("quarantined")
        || tags.get(MARKER_TAG).map(String::as_str) == Some("true");

    tags.insert(PII_DETECTED_TAG.into(), "true".into());
    tags.insert(PII_SEVERITY_TAG.into(), severity.as_str().into());
    tags.insert(
        PII_DETECTION_DATE_TAG.into(),
        finding.detected_at.format("%Y-%m-%d").to_string(),
    );
    tags.insert(
        SECURITY_STATUS_TAG.into(),
        if quarantined { "quarantined" } else { "flagged" }.into(),
    );
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemoryAlertSink;
    use crate::audit::MemoryAuditSink;
    use crate::dispatch::record::ActionStatus;
    use crate::quarantine::{
        Fault, InMemoryLedger, InMemoryObjectStore, ObjectStore, StoreOp, StoredObject,
    };
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryObjectStore>,
        audit_sink: Arc<MemoryAuditSink>,
        pager: Arc<MemoryAlertSink>,
        dispatcher: ActionDispatcher,
    }

    const BUDGET: Duration = Duration::from_secs(60);

    fn original() -> ObjectLocator {
        ObjectLocator::new("media", "a.csv")
    }

    fn quarantined() -> ObjectLocator {
        ObjectLocator::new("media", "quarantine/a.csv")
    }

    fn fixture() -> Fixture {
        let store = Arc::new(
            InMemoryObjectStore::new().with_object(original(), StoredObject::new("ssn data")),
        );
        let audit_sink = Arc::new(MemoryAuditSink::new());
        let audit = AuditLogger::new().with_sink(audit_sink.clone());
        let pager = Arc::new(MemoryAlertSink::new());
        let alerts = AlertEmitter::new(audit.clone()).with_channel("pager", pager.clone());
        let manager = QuarantineManager::new(store.clone(), Arc::new(InMemoryLedger::new()));
        Fixture {
            store,
            audit_sink,
            pager,
            dispatcher: ActionDispatcher::new(manager, alerts, audit, RecordStore::new()),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.alert_channels = vec!["pager".into()];
        config
    }

    #[tokio::test]
    async fn test_high_tier_runs_full_plan() {
        let fx = fixture();
        let finding = Finding::new("f-1", original(), "ssn", 0.95);

        let outcome = fx.dispatcher.dispatch(&finding, SeverityTier::High, &config(), BUDGET).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.record.status, ActionStatus::Completed);
        assert_eq!(
            outcome.record.actions_completed,
            ActionKind::default_plan(SeverityTier::High)
        );

        let copy = fx
            .store
            .object(&ObjectLocator::new("media", "quarantine/a.csv"))
            .unwrap();
        assert_eq!(copy.tags.get(PII_SEVERITY_TAG).map(String::as_str), Some("high"));
        assert_eq!(
            copy.tags.get(SECURITY_STATUS_TAG).map(String::as_str),
            Some("quarantined")
        );
        assert_eq!(fx.pager.sent().len(), 1);
        assert_eq!(fx.audit_sink.records().len(), 5);
    }

    #[tokio::test]
    async fn test_medium_tier_tags_original() {
        let fx = fixture();
        let finding = Finding::new("f-1", original(), "ssn", 0.5);

        let outcome = fx
            .dispatcher
            .dispatch(&finding, SeverityTier::Medium, &config(), BUDGET)
            .await;

        assert_eq!(outcome.record.status, ActionStatus::Completed);
        let object = fx.store.object(&original()).unwrap();
        assert_eq!(object.tags.get(PII_DETECTED_TAG).map(String::as_str), Some("true"));
        assert_eq!(
            object.tags.get(SECURITY_STATUS_TAG).map(String::as_str),
            Some("flagged")
        );
        assert!(fx.pager.sent().is_empty());
    }

    #[tokio::test]
    async fn test_severity_tag_never_downgraded() {
        let fx = fixture();
        let mut tags = Tags::new();
        tags.insert(PII_SEVERITY_TAG.into(), "critical".into());
        fx.store
            .insert(original(), StoredObject::new("data").with_tags(tags));

        let finding = Finding::new("f-1", original(), "ssn", 0.5);
        fx.dispatcher
            .dispatch(&finding, SeverityTier::Medium, &config(), BUDGET)
            .await;

        let object = fx.store.object(&original()).unwrap();
        assert_eq!(object.tags.get(PII_SEVERITY_TAG).map(String::as_str), Some("critical"));
    }

    #[tokio::test]
    async fn test_mandatory_failure_then_resume() {
        let fx = fixture();
        fx.store.fail_next(StoreOp::SetAccess, Fault::Unavailable, 1);
        let finding = Finding::new("f-1", original(), "ssn", 0.95);

        let first = fx.dispatcher.dispatch(&finding, SeverityTier::High, &config(), BUDGET).await;
        assert_eq!(first.record.status, ActionStatus::Failed);
        assert!(first.error.as_ref().is_some_and(|e| e.is_retryable()));
        assert_eq!(first.record.actions_completed, vec![ActionKind::Quarantine]);

        let second = fx.dispatcher.dispatch(&finding, SeverityTier::High, &config(), BUDGET).await;
        assert_eq!(second.record.status, ActionStatus::Completed);
        assert_eq!(second.record.attempts, 2);
        assert_eq!(fx.store.call_count(StoreOp::Copy), 1);
    }

    #[tokio::test]
    async fn test_best_effort_failure_does_not_fail_record() {
        let fx = fixture();
        fx.pager.fail_next(100);
        let finding = Finding::new("f-1", original(), "ssn", 0.95);

        let mut config = config();
        config.alert_channels = vec!["pager".into()];
        let dispatcher = ActionDispatcher::new(
            fx.dispatcher.quarantine.clone(),
            fx.dispatcher
                .alerts
                .clone()
                .with_retry(crate::dispatch::RetryConfig::no_retry()),
            fx.dispatcher.audit.clone(),
            RecordStore::new(),
        );

        let outcome = dispatcher.dispatch(&finding, SeverityTier::High, &config, BUDGET).await;
        assert_eq!(outcome.record.status, ActionStatus::Completed);
        let alert_outcome = outcome
            .record
            .outcomes
            .iter()
            .find(|o| o.action == ActionKind::Alert)
            .unwrap();
        assert!(!alert_outcome.succeeded);
    }

    #[tokio::test]
    async fn test_medium_tags_follow_object_into_quarantine() {
        let fx = fixture();
        let critical = Finding::new("f-critical", original(), "credentials", 0.99);
        fx.dispatcher
            .dispatch(&critical, SeverityTier::Critical, &config(), BUDGET)
            .await;
        assert!(!fx.store.contains(&original()));

        let medium = Finding::new("f-medium", original(), "ssn", 0.5);
        let outcome = fx
            .dispatcher
            .dispatch(&medium, SeverityTier::Medium, &config(), BUDGET)
            .await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.record.status, ActionStatus::Completed);
        let copy = fx.store.object(&quarantined()).unwrap();
        assert_eq!(copy.tags.get(PII_SEVERITY_TAG).map(String::as_str), Some("critical"));
        assert_eq!(
            copy.tags.get(SECURITY_STATUS_TAG).map(String::as_str),
            Some("quarantined")
        );
        assert!(!fx.store.contains(&original()));
    }

    #[tokio::test]
    async fn test_tag_on_vanished_object_is_missing() {
        let fx = fixture();
        fx.store.delete(&original()).await.unwrap();
        let finding = Finding::new("f-1", original(), "ssn", 0.5);

        let outcome = fx
            .dispatcher
            .dispatch(&finding, SeverityTier::Medium, &config(), BUDGET)
            .await;
        assert!(matches!(
            outcome.error,
            Some(ResponseError::ObjectMissing { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_alert_bounded_by_budget() {
        let fx = fixture();
        let slow = Arc::new(MemoryAlertSink::new().with_latency(Duration::from_secs(2)));
        let dispatcher = ActionDispatcher::new(
            fx.dispatcher.quarantine.clone(),
            fx.dispatcher.alerts.clone().with_channel("pager", slow.clone()),
            fx.dispatcher.audit.clone(),
            RecordStore::new(),
        );
        let finding = Finding::new("f-1", original(), "ssn", 0.95);

        let outcome = dispatcher
            .dispatch(&finding, SeverityTier::High, &config(), Duration::from_secs(1))
            .await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.record.status, ActionStatus::Completed);
        assert!(outcome.record.actions_completed.contains(&ActionKind::Log));
        assert!(slow.sent().is_empty());
        assert_eq!(
            fx.audit_sink
                .records_for_action(crate::alert::ALERT_FALLBACK_ACTION)
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_exceeds_budget() {
        let store = Arc::new(
            InMemoryObjectStore::new()
                .with_object(original(), StoredObject::new("ssn data"))
                .with_latency(Duration::from_millis(40)),
        );
        let audit = AuditLogger::new();
        let dispatcher = ActionDispatcher::new(
            QuarantineManager::new(store.clone(), Arc::new(InMemoryLedger::new())),
            AlertEmitter::new(audit.clone()),
            audit,
            RecordStore::new(),
        );
        let finding = Finding::new("f-1", original(), "ssn", 0.95);

        let outcome = dispatcher
            .dispatch(&finding, SeverityTier::High, &config(), Duration::from_millis(100))
            .await;

        assert_eq!(outcome.record.status, ActionStatus::Failed);
        assert!(matches!(
            outcome.error,
            Some(ResponseError::BudgetExceeded { .. })
        ));
        assert!(store.contains(&original()));
    }

    #[tokio::test]
    async fn test_completed_record_is_not_redispatched() {
        let fx = fixture();
        let finding = Finding::new("f-1", original(), "email", 0.4);

        let first = fx.dispatcher.dispatch(&finding, SeverityTier::Low, &config(), BUDGET).await;
        let second = fx.dispatcher.dispatch(&finding, SeverityTier::Low, &config(), BUDGET).await;

        assert!(first.executed);
        assert!(!second.executed);
        assert_eq!(first.record, second.record);
        assert_eq!(fx.audit_sink.records().len(), 1);
    }
}
