//! End-to-end behavior of the response engine against in-memory stores.

use pii_responder::alert::{MemoryAlertSink, ALERT_FALLBACK_ACTION};
use pii_responder::audit::{AuditOutcome, JsonLinesAuditSink, MemoryAuditSink};
use pii_responder::config::{namespace, ConfigProvider, InMemoryConfigStore};
use pii_responder::dispatch::{RetryConfig, PII_SEVERITY_TAG, SECURITY_STATUS_TAG};
use pii_responder::quarantine::{
    Fault, FilesystemLedger, QuarantineFilter, ReviewStatus, StoreOp, MARKER_TAG,
};
use pii_responder::prelude::*;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

const NAMESPACE_PROJECT: &str = "pii-responder";
const NAMESPACE_ENV: &str = "test";

struct Harness {
    store: Arc<InMemoryObjectStore>,
    ledger: Arc<InMemoryLedger>,
    audit: Arc<MemoryAuditSink>,
    pager: Arc<MemoryAlertSink>,
    engine: ResponseEngine,
}

fn original() -> ObjectLocator {
    ObjectLocator::new("media", "reports/customers.csv")
}

fn quarantined() -> ObjectLocator {
    ObjectLocator::new("media", "quarantine/reports/customers.csv")
}

fn config_store() -> InMemoryConfigStore {
    let ns = namespace(NAMESPACE_PROJECT, NAMESPACE_ENV);
    InMemoryConfigStore::new().with_entry(format!("{}/alerts/channels", ns), "pager")
}

fn harness_with(engine_config: EngineConfig) -> Harness {
    harness_with_pager(engine_config, MemoryAlertSink::new())
}

fn harness_with_pager(engine_config: EngineConfig, pager: MemoryAlertSink) -> Harness {
    let store = Arc::new(
        InMemoryObjectStore::new().with_object(original(), StoredObject::new("name,ssn\nann,123")),
    );
    let ledger = Arc::new(InMemoryLedger::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let pager = Arc::new(pager);
    let provider = Arc::new(ConfigProvider::new(
        Arc::new(config_store()),
        namespace(NAMESPACE_PROJECT, NAMESPACE_ENV),
    ));

    let engine = ResponseEngine::builder()
        .with_config_provider(provider)
        .with_object_store(store.clone())
        .with_ledger(ledger.clone())
        .add_audit_sink(audit.clone())
        .add_alert_channel("pager", pager.clone())
        .with_config(engine_config)
        .build()
        .unwrap();

    Harness {
        store,
        ledger,
        audit,
        pager,
        engine,
    }
}

fn fast_retry() -> EngineConfig {
    EngineConfig::new().with_retry(
        RetryConfig::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false),
    )
}

fn harness() -> Harness {
    harness_with(fast_retry())
}

fn finding(id: &str, finding_type: &str, confidence: f64) -> Finding {
    Finding::new(id, original(), finding_type, confidence)
}

#[tokio::test]
async fn high_confidence_ssn_is_quarantined() {
    let h = harness();

    let outcome = h
        .engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    assert_eq!(outcome.assessment.unwrap().effective, SeverityTier::High);
    assert_eq!(outcome.status(), ActionStatus::Completed);
    assert_eq!(
        outcome.record.actions_completed,
        vec![
            ActionKind::Quarantine,
            ActionKind::RestrictAccess,
            ActionKind::Tag,
            ActionKind::Alert,
            ActionKind::Log,
        ]
    );

    assert!(!h.store.contains(&original()));
    let copy = h.store.object(&quarantined()).unwrap();
    assert_eq!(copy.body, b"name,ssn\nann,123".to_vec());
    assert!(copy.tags.contains_key(MARKER_TAG));
    assert_eq!(copy.tags.get(SECURITY_STATUS_TAG).map(String::as_str), Some("quarantined"));

    let entry = h.ledger.get(&original()).await.unwrap().unwrap();
    assert_eq!(entry.review_status, ReviewStatus::Pending);
    assert_eq!(entry.quarantine_locator, quarantined());
    assert_eq!(
        entry.review_deadline - entry.quarantined_at,
        ChronoDuration::days(90)
    );

    assert_eq!(h.pager.sent().len(), 1);
    for action in ["classify", "quarantine", "restrict-access", "tag", "alert", "log"] {
        assert_eq!(h.audit.records_for_action(action).len(), 1, "{}", action);
    }
}

#[tokio::test]
async fn low_confidence_email_is_only_logged() {
    let h = harness();

    let outcome = h
        .engine
        .process_finding(finding("f-b", "email", 0.40))
        .await
        .unwrap();

    assert_eq!(outcome.record.tier, SeverityTier::Low);
    assert_eq!(outcome.record.actions_completed, vec![ActionKind::Log]);
    assert_eq!(h.store.call_count(StoreOp::Copy), 0);
    assert_eq!(h.store.call_count(StoreOp::PutTags), 0);
    assert_eq!(h.store.call_count(StoreOp::Delete), 0);
    assert!(h.store.object(&original()).unwrap().tags.is_empty());
    assert!(h.pager.sent().is_empty());
}

#[tokio::test]
async fn redelivery_short_circuits() {
    let h = harness();
    let f = finding("f-a", "ssn", 0.95);

    let first = h.engine.process_finding(f.clone()).await.unwrap();
    let second = h.engine.process_finding(f).await.unwrap();

    assert!(second.short_circuited);
    assert_eq!(first.record, second.record);
    assert_eq!(h.store.call_count(StoreOp::Copy), 1);
    assert_eq!(h.ledger.count().await.unwrap(), 1);

    let short = h.audit.records_for_action("short_circuit");
    assert_eq!(short.len(), 1);
    assert_eq!(short[0].outcome, AuditOutcome::ShortCircuited);
}

#[tokio::test]
async fn overdue_review_expires_and_escalates() {
    let h = harness();
    h.engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    let not_yet = h.engine.sweep(Utc::now() + ChronoDuration::days(30)).await.unwrap();
    assert!(not_yet.expired.is_empty());

    let report = h
        .engine
        .sweep(Utc::now() + ChronoDuration::days(91))
        .await
        .unwrap();
    assert_eq!(report.expired, vec![original()]);
    assert_eq!(report.escalated, 1);

    let entry = h.ledger.get(&original()).await.unwrap().unwrap();
    assert_eq!(entry.review_status, ReviewStatus::Expired);
    assert_eq!(h.audit.records_for_action("review_expired_escalated").len(), 1);
    // dispatch alert plus expiry escalation
    assert_eq!(h.pager.sent().len(), 2);
    assert!(h.store.contains(&quarantined()));
}

#[tokio::test]
async fn concurrent_deliveries_quarantine_once() {
    let h = harness();
    let f = finding("f-a", "ssn", 0.95);

    let (a, b) = tokio::join!(
        h.engine.process_finding(f.clone()),
        h.engine.process_finding(f.clone())
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.short_circuited).count(), 1);
    assert_eq!(h.store.call_count(StoreOp::Copy), 1);
    assert_eq!(h.ledger.count().await.unwrap(), 1);

    let record = h.engine.record(&f.idempotency_key()).unwrap();
    assert_eq!(record.status, ActionStatus::Completed);
}

#[tokio::test]
async fn severity_is_monotonic_medium_then_critical() {
    let h = harness();

    let medium = h
        .engine
        .process_finding(finding("f-medium", "ssn", 0.5))
        .await
        .unwrap();
    assert_eq!(medium.record.tier, SeverityTier::Medium);
    assert_eq!(
        medium.record.actions_completed,
        vec![ActionKind::Tag, ActionKind::Log]
    );

    let critical = h
        .engine
        .process_finding(finding("f-critical", "credentials", 0.99))
        .await
        .unwrap();
    assert_eq!(critical.record.tier, SeverityTier::Critical);
    assert_eq!(
        critical.record.actions_completed,
        ActionKind::default_plan(SeverityTier::Critical)
    );

    let copy = h.store.object(&quarantined()).unwrap();
    assert_eq!(copy.tags.get(PII_SEVERITY_TAG).map(String::as_str), Some("critical"));
    assert_eq!(h.ledger.count().await.unwrap(), 1);
}

#[tokio::test]
async fn severity_is_monotonic_critical_then_medium() {
    let h = harness();

    h.engine
        .process_finding(finding("f-critical", "credentials", 0.99))
        .await
        .unwrap();
    let medium = h
        .engine
        .process_finding(finding("f-medium", "ssn", 0.5))
        .await
        .unwrap();

    let assessment = medium.assessment.unwrap();
    assert_eq!(assessment.classified, SeverityTier::Medium);
    assert_eq!(assessment.effective, SeverityTier::Critical);
    assert_eq!(medium.status(), ActionStatus::Completed);
    assert_eq!(
        medium.record.actions_completed,
        ActionKind::default_plan(SeverityTier::Critical)
    );

    let copy = h.store.object(&quarantined()).unwrap();
    assert_eq!(copy.tags.get(PII_SEVERITY_TAG).map(String::as_str), Some("critical"));
    assert_eq!(h.store.call_count(StoreOp::Copy), 1);
    assert_eq!(h.ledger.count().await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_medium_and_critical_findings_both_complete() {
    let h = harness();
    h.store.fail_next(StoreOp::GetTags, Fault::Unavailable, 1);

    let (medium, critical) = tokio::join!(
        h.engine.process_finding(finding("f-medium", "ssn", 0.5)),
        h.engine.process_finding(finding("f-critical", "credentials", 0.99))
    );
    let (medium, critical) = (medium.unwrap(), critical.unwrap());

    assert_eq!(medium.status(), ActionStatus::Completed);
    assert_eq!(critical.status(), ActionStatus::Completed);
    assert!(h.engine.dead_letters().is_empty());
    assert!(!h.store.contains(&original()));

    let copy = h.store.object(&quarantined()).unwrap();
    assert_eq!(copy.tags.get(PII_SEVERITY_TAG).map(String::as_str), Some("critical"));
    assert_eq!(
        copy.tags.get(SECURITY_STATUS_TAG).map(String::as_str),
        Some("quarantined")
    );
    assert!(h
        .pager
        .sent()
        .iter()
        .all(|m| !m.summary.starts_with("Manual remediation")));
}

#[tokio::test(start_paused = true)]
async fn slow_alert_channel_does_not_fail_the_record() {
    let h = harness_with_pager(
        EngineConfig::new()
            .with_execution_budget(Duration::from_secs(1))
            .with_retry(RetryConfig::no_retry()),
        MemoryAlertSink::new().with_latency(Duration::from_secs(2)),
    );

    let outcome = h
        .engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    assert_eq!(outcome.status(), ActionStatus::Completed);
    assert_eq!(outcome.record.attempts, 1);
    assert!(h.engine.dead_letters().is_empty());
    assert!(h.pager.sent().is_empty());
    assert!(!h.store.contains(&original()));

    let alert = outcome
        .record
        .outcomes
        .iter()
        .find(|o| o.action == ActionKind::Alert)
        .unwrap();
    assert!(!alert.succeeded);
    assert_eq!(h.audit.records_for_action(ALERT_FALLBACK_ACTION).len(), 1);
    assert_eq!(h.audit.records_for_action("log").len(), 1);
}

#[tokio::test]
async fn failed_delete_never_loses_data() {
    let h = harness();
    h.store.fail_always(StoreOp::Delete, Fault::Unavailable);

    let outcome = h
        .engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    assert_eq!(outcome.status(), ActionStatus::DeadLettered);
    assert!(h.store.contains(&original()));
    assert!(h.store.contains(&quarantined()));
    assert_eq!(h.store.call_count(StoreOp::Copy), 1);

    let letters = h.engine.dead_letters().list();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 3);
    assert!(letters[0].reason.starts_with("retries exhausted"));
}

#[tokio::test]
async fn corrupt_copy_is_replaced_on_retry() {
    let h = harness();
    h.store.corrupt_next_copies(1);

    let outcome = h
        .engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    assert_eq!(outcome.status(), ActionStatus::Completed);
    assert_eq!(outcome.record.attempts, 2);
    assert_eq!(h.store.call_count(StoreOp::Copy), 2);
    let copy = h.store.object(&quarantined()).unwrap();
    assert_eq!(copy.body, b"name,ssn\nann,123".to_vec());
    assert!(!h.store.contains(&original()));
}

#[tokio::test]
async fn failed_record_resumes_without_repeating_work() {
    let h = harness();
    h.store.fail_next(StoreOp::SetAccess, Fault::Unavailable, 1);

    let outcome = h
        .engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    assert_eq!(outcome.status(), ActionStatus::Completed);
    assert_eq!(outcome.record.attempts, 2);
    assert_eq!(h.store.call_count(StoreOp::Copy), 1);

    let quarantine = h.audit.records_for_action("quarantine");
    assert_eq!(quarantine.len(), 1);
    let restrict = h.audit.records_for_action("restrict-access");
    assert_eq!(restrict.len(), 2);
    assert_eq!(restrict[0].outcome, AuditOutcome::Failed);
    assert_eq!(restrict[1].outcome, AuditOutcome::Succeeded);
}

#[tokio::test]
async fn missing_object_is_dead_lettered_and_escalated() {
    let h = harness();
    let ghost = Finding::new(
        "f-ghost",
        ObjectLocator::new("media", "gone.csv"),
        "ssn",
        0.95,
    );

    let outcome = h.engine.process_finding(ghost).await.unwrap();

    assert_eq!(outcome.status(), ActionStatus::DeadLettered);
    assert_eq!(outcome.record.attempts, 1);
    let letters = h.engine.dead_letters().list();
    assert!(letters[0].fatal);

    let escalations: Vec<_> = h
        .pager
        .sent()
        .into_iter()
        .filter(|m| m.severity == SeverityTier::Critical)
        .collect();
    assert_eq!(escalations.len(), 1);
    assert_eq!(h.audit.records_for_action("dead_letter").len(), 1);
}

#[tokio::test]
async fn review_cleared_restores_object() {
    let h = harness();
    h.engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    let entry = h
        .engine
        .review(&original(), ReviewDecision::Cleared)
        .await
        .unwrap();

    assert_eq!(entry.review_status, ReviewStatus::Cleared);
    assert!(h.store.contains(&original()));
    assert!(!h.store.contains(&quarantined()));
    assert!(h
        .ledger
        .list(QuarantineFilter::new().with_status(ReviewStatus::Pending))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.audit.records_for_action("review_cleared").len(), 1);
}

#[tokio::test]
async fn audit_sequence_is_ordered_per_object() {
    let h = harness();
    h.engine
        .process_finding(finding("f-a", "ssn", 0.95))
        .await
        .unwrap();

    let sequences: Vec<u64> = h
        .audit
        .records()
        .into_iter()
        .filter(|r| r.object_locator == original())
        .map(|r| r.sequence)
        .collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sequences, sorted);
}

#[tokio::test]
async fn envelope_event_is_handled() {
    let h = harness();
    let event = serde_json::json!({
        "source": "aws.macie2",
        "time": Utc::now().to_rfc3339(),
        "detail": {
            "id": "macie-1",
            "type": "SensitiveData:S3Object/Personal",
            "severity": {"description": "High"},
            "resources": [
                {"resourceType": "S3Object", "s3Object": {"bucketName": "media", "key": "reports/customers.csv"}}
            ]
        }
    });

    let response = h.engine.handle_event(&event.to_string()).await;

    assert_eq!(response.status_code, 200);
    let result = response.body.result.unwrap();
    assert_eq!(result["processed"], true);
    assert_eq!(result["findings"][0]["status"], "COMPLETED");
    assert!(h.store.contains(&quarantined()));
}

#[tokio::test]
async fn config_outage_fails_closed() {
    let store = Arc::new(InMemoryObjectStore::new().with_object(
        original(),
        StoredObject::new("data"),
    ));
    let config_store = Arc::new(config_store());
    config_store.set_available(false);
    let engine = ResponseEngine::builder()
        .with_config_provider(Arc::new(ConfigProvider::new(
            config_store,
            namespace(NAMESPACE_PROJECT, NAMESPACE_ENV),
        )))
        .with_object_store(store.clone())
        .with_config(fast_retry())
        .build()
        .unwrap();

    // unknown types are treated as high without a loaded configuration
    let outcome = engine
        .process_finding(Finding::new("f-1", original(), "passport_scan", 0.3))
        .await
        .unwrap();

    assert_eq!(outcome.record.tier, SeverityTier::High);
    assert!(store.contains(&quarantined()));
}

#[tokio::test]
async fn durable_ledger_and_audit_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger");
    let audit_path = dir.path().join("audit.jsonl");
    let store = Arc::new(
        InMemoryObjectStore::new().with_object(original(), StoredObject::new("data")),
    );

    {
        let engine = ResponseEngine::builder()
            .with_object_store(store.clone())
            .with_ledger(Arc::new(FilesystemLedger::open(&ledger_path).unwrap()))
            .add_audit_sink(Arc::new(JsonLinesAuditSink::new(&audit_path)))
            .with_config(fast_retry())
            .build()
            .unwrap();
        engine
            .process_finding(finding("f-a", "ssn", 0.95))
            .await
            .unwrap();
    }

    let reopened = FilesystemLedger::open(&ledger_path).unwrap();
    let entry = reopened.get(&original()).await.unwrap().unwrap();
    assert_eq!(entry.finding_id, "f-a");

    let records = JsonLinesAuditSink::new(&audit_path).read_all().await.unwrap();
    assert!(records.iter().any(|r| r.action == "quarantine"));
    assert!(records.iter().all(|r| r.finding_id == "f-a"));
}
