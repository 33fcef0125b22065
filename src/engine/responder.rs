//! The response engine implementation.

use crate::alert::{AlertEmitter, AlertMessage, AlertSink};
use crate::audit::{AuditLogger, AuditOutcome, AuditRecord, AuditSink};
use crate::classify::SeverityClassifier;
use crate::config::{namespace, Config, ConfigProvider, InMemoryConfigStore};
use crate::core::{
    Finding, IdempotencyKey, ObjectLocator, ResponseError, ResponseResult, SeverityTier,
    ValidationError,
};
use crate::dispatch::{
    ActionDispatcher, ActionRecord, ActionStatus, DispatchOutcome, RecordStore,
};
use crate::engine::config::EngineConfig;
use crate::engine::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::engine::response::{HandlerResponse, ProcessOutcome};
use crate::ingest::{Admission, EventIngester};
use crate::quarantine::{
    InMemoryLedger, ObjectStore, QuarantineEntry, QuarantineLedger, QuarantineManager,
    ReviewDecision, ReviewSweeper, SweepReport,
};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Builder for creating a `ResponseEngine`.
pub struct ResponseEngineBuilder {
    provider: Option<Arc<ConfigProvider>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    ledger: Option<Arc<dyn QuarantineLedger>>,
    audit_sinks: Vec<Arc<dyn AuditSink>>,
    alert_channels: Vec<(String, Arc<dyn AlertSink>)>,
    config: EngineConfig,
}

impl ResponseEngineBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            provider: None,
            object_store: None,
            ledger: None,
            audit_sinks: Vec::new(),
            alert_channels: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Sets the configuration provider.
    pub fn with_config_provider(mut self, provider: Arc<ConfigProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the object store findings refer to.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Sets the quarantine ledger.
    pub fn with_ledger(mut self, ledger: Arc<dyn QuarantineLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Adds an audit sink next to the tracing sink.
    pub fn add_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sinks.push(sink);
        self
    }

    /// Registers an alert channel.
    pub fn add_alert_channel(mut self, name: impl Into<String>, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_channels.push((name.into(), sink));
        self
    }

    /// Sets the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if no object store was set.
    pub fn build(self) -> ResponseResult<ResponseEngine> {
        let object_store = self
            .object_store
            .ok_or_else(|| ResponseError::internal("an object store is required"))?;
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryLedger::new()));
        let provider = self.provider.unwrap_or_else(|| {
            Arc::new(ConfigProvider::new(
                Arc::new(InMemoryConfigStore::new()),
                namespace("pii-responder", "default"),
            ))
        });

        let audit = self
            .audit_sinks
            .into_iter()
            .fold(AuditLogger::default(), AuditLogger::with_sink);
        let alerts = self
            .alert_channels
            .into_iter()
            .fold(AlertEmitter::new(audit.clone()), |emitter, (name, sink)| {
                emitter.with_channel(name, sink)
            });
        let quarantine = QuarantineManager::new(object_store, ledger);
        let dispatcher = ActionDispatcher::new(
            quarantine.clone(),
            alerts.clone(),
            audit.clone(),
            RecordStore::with_retention(self.config.dedupe_capacity, self.config.dedupe_window),
        );

        Ok(ResponseEngine {
            provider,
            ingester: EventIngester::new(self.config.dedupe_capacity, self.config.dedupe_window),
            classifier: SeverityClassifier::new(),
            dispatcher,
            quarantine,
            alerts,
            audit,
            dead_letters: DeadLetterQueue::new(),
            workers: Arc::new(Semaphore::new(self.config.max_concurrent.max(1))),
            config: self.config,
        })
    }
}

impl Default for ResponseEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives findings from ingestion to a terminal action record.
///
/// Each finding is validated, deduplicated, classified against its object's
/// history and dispatched. Failed dispatches are retried with backoff inside
/// the worker slot; fatal errors and exhausted retries end in a dead letter.
#[derive(Debug)]
pub struct ResponseEngine {
    provider: Arc<ConfigProvider>,
    ingester: EventIngester,
    classifier: SeverityClassifier,
    dispatcher: ActionDispatcher,
    quarantine: QuarantineManager,
    alerts: AlertEmitter,
    audit: AuditLogger,
    dead_letters: DeadLetterQueue,
    workers: Arc<Semaphore>,
    config: EngineConfig,
}

impl ResponseEngine {
    /// Creates a new builder.
    pub fn builder() -> ResponseEngineBuilder {
        ResponseEngineBuilder::new()
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The configuration provider.
    pub fn config_provider(&self) -> &Arc<ConfigProvider> {
        &self.provider
    }

    /// The action record store.
    pub fn records(&self) -> &RecordStore {
        self.dispatcher.records()
    }

    /// The quarantine manager.
    pub fn quarantine(&self) -> &QuarantineManager {
        &self.quarantine
    }

    /// The audit logger.
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Dead-lettered findings.
    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    /// Returns the record of a finding delivery, if it was seen.
    pub fn record(&self, key: &IdempotencyKey) -> Option<ActionRecord> {
        self.records().get(key)
    }

    /// Processes one validated finding to a terminal record.
    ///
    /// # Errors
    ///
    /// Returns `Internal` only if the worker pool was closed. Action failures
    /// are reflected in the returned record, never as an error.
    pub async fn process_finding(&self, finding: Finding) -> ResponseResult<ProcessOutcome> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| ResponseError::internal("worker pool closed"))?;

        let config = self.provider.snapshot().await;
        let key = finding.idempotency_key();

        if let Admission::Duplicate(status) = self.ingester.admit(&finding).await {
            let record = self.records().get(&key).unwrap_or_else(|| {
                let mut record = ActionRecord::new(&key);
                record.status = status;
                record
            });
            self.audit_short_circuit(&record).await;
            return Ok(ProcessOutcome {
                record,
                assessment: None,
                short_circuited: true,
            });
        }

        let assessment = self.classifier.assess(&finding, &config);
        self.audit
            .log(
                AuditRecord::new(
                    finding.id.clone(),
                    finding.object_locator.clone(),
                    "classify",
                    AuditOutcome::Succeeded,
                )
                .with_tier(assessment.effective)
                .with_detail(format!(
                    "type={} intrinsic={} classified={} window_occurrences={}",
                    finding.finding_type,
                    assessment.intrinsic,
                    assessment.classified,
                    assessment.window_occurrences
                )),
            )
            .await;

        let (record, short_circuited) = self.drive(&finding, assessment.effective, &config).await;
        if record.status != ActionStatus::Dispatching {
            self.ingester.record_status(&key, record.status).await;
        }
        if short_circuited {
            self.audit_short_circuit(&record).await;
        }

        Ok(ProcessOutcome {
            record,
            assessment: Some(assessment),
            short_circuited,
        })
    }

    /// Processes findings concurrently, bounded by the worker count.
    pub async fn process_batch(&self, findings: Vec<Finding>) -> Vec<ResponseResult<ProcessOutcome>> {
        join_all(findings.into_iter().map(|f| self.process_finding(f))).await
    }

    /// Validates a JSON payload and processes every finding it carries.
    ///
    /// # Errors
    ///
    /// Returns the `ValidationError` for a rejected payload; nothing is processed.
    pub async fn process_payload(
        &self,
        payload: &Value,
    ) -> Result<Vec<ResponseResult<ProcessOutcome>>, ValidationError> {
        let findings = self.ingester.validate(payload)?;
        Ok(self.process_batch(findings).await)
    }

    /// Handles a raw event, producing an HTTP-style response.
    pub async fn handle_event(&self, payload: &str) -> HandlerResponse {
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => self.handle_value(&value).await,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting unparsable event");
                HandlerResponse::rejected("Invalid event payload", e.to_string())
            }
        }
    }

    /// Handles an already parsed event.
    pub async fn handle_value(&self, payload: &Value) -> HandlerResponse {
        let results = match self.process_payload(payload).await {
            Ok(results) => results,
            Err(ValidationError::UnsupportedSource { source_name }) => {
                return HandlerResponse::ok(
                    "Event ignored",
                    serde_json::json!({
                        "processed": false,
                        "reason": format!("unknown event source '{}'", source_name),
                    }),
                );
            }
            Err(e) => return HandlerResponse::rejected("Invalid event payload", e.to_string()),
        };

        let mut summaries = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(outcome) => summaries.push(outcome.summary()),
                Err(e) => errors.push(e.to_string()),
            }
        }

        if !errors.is_empty() {
            tracing::error!(errors = ?errors, "Event processing failed");
            return HandlerResponse::failed("Event processing failed", errors.join("; "));
        }

        HandlerResponse::ok(
            "Event processed successfully",
            serde_json::json!({ "processed": true, "findings": summaries }),
        )
    }

    /// Applies a review decision and audits it.
    ///
    /// # Errors
    ///
    /// Returns the ledger or storage error of the review.
    pub async fn review(
        &self,
        original: &ObjectLocator,
        decision: ReviewDecision,
    ) -> ResponseResult<QuarantineEntry> {
        let action = match decision {
            ReviewDecision::Cleared => "review_cleared",
            ReviewDecision::Confirmed => "review_confirmed",
        };
        match self.quarantine.review(original, decision).await {
            Ok(entry) => {
                self.audit
                    .log(
                        AuditRecord::new(
                            entry.finding_id.clone(),
                            original.clone(),
                            action,
                            AuditOutcome::Succeeded,
                        )
                        .with_tier(entry.severity),
                    )
                    .await;
                Ok(entry)
            }
            Err(e) => {
                tracing::warn!(object = %original, error = %e, "Review failed");
                Err(e)
            }
        }
    }

    /// A sweeper sharing this engine's store, ledger, alerts and audit log.
    pub fn sweeper(&self) -> ReviewSweeper {
        ReviewSweeper::new(
            self.quarantine.clone(),
            self.alerts.clone(),
            self.audit.clone(),
        )
    }

    /// Expires overdue quarantine entries using the current configuration,
    /// and drops classifier history that left the repeat window.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if overdue entries cannot be listed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> ResponseResult<SweepReport> {
        let config = self.provider.snapshot().await;
        self.classifier.prune(now, &config);
        self.sweeper().sweep(now, &config).await
    }

    /// Dispatches until the record is terminal. The flag is true if nothing ran.
    async fn drive(
        &self,
        finding: &Finding,
        tier: SeverityTier,
        config: &Config,
    ) -> (ActionRecord, bool) {
        let key = finding.idempotency_key();
        let budget = self.config.execution_budget;
        let mut failures = 0u32;

        loop {
            let error = match self.dispatcher.dispatch(finding, tier, config, budget).await {
                DispatchOutcome {
                    record,
                    executed: false,
                    ..
                } => return (record, failures == 0),
                DispatchOutcome {
                    record,
                    error: None,
                    ..
                } => return (record, false),
                DispatchOutcome { error: Some(e), .. } => e,
            };

            failures += 1;
            if error.is_fatal() {
                return (self.dead_letter(&key, &error, true, config).await, false);
            }
            let delay = if error.is_retryable() {
                self.config.retry.next_delay(failures, &finding.id, None)
            } else {
                None
            };
            let Some(delay) = delay else {
                return (self.dead_letter(&key, &error, false, config).await, false);
            };

            tracing::info!(
                finding_id = %finding.id,
                attempt = failures,
                max_attempts = self.config.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying dispatch"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn dead_letter(
        &self,
        key: &IdempotencyKey,
        error: &ResponseError,
        fatal: bool,
        config: &Config,
    ) -> ActionRecord {
        let reason = if fatal || !error.is_retryable() {
            format!("{}: {}", error.kind(), error)
        } else {
            format!("retries exhausted: {}", error)
        };

        let record = self.records().dead_letter(key, &reason).unwrap_or_else(|| {
            let mut record = ActionRecord::new(key);
            record.dead_letter(reason.clone());
            record
        });
        let letter = DeadLetter::from_record(&record, reason.clone(), fatal);

        tracing::error!(
            finding_id = %record.finding_id,
            object = %record.object_locator,
            dead_letter_id = %letter.id,
            attempts = record.attempts,
            fatal = fatal,
            reason = %reason,
            "Finding dead-lettered"
        );
        self.dead_letters.push(letter);

        self.audit
            .log(
                AuditRecord::new(
                    record.finding_id.clone(),
                    record.object_locator.clone(),
                    "dead_letter",
                    AuditOutcome::DeadLettered,
                )
                .with_tier(record.tier)
                .with_detail(reason.clone()),
            )
            .await;

        if fatal {
            let message = AlertMessage::new(
                SeverityTier::Critical,
                record.finding_id.clone(),
                record.object_locator.clone(),
                format!("Manual remediation required: {}", reason),
            );
            self.alerts.emit(&message, &config.alert_channels).await;
        }
        record
    }

    async fn audit_short_circuit(&self, record: &ActionRecord) {
        self.audit
            .log(
                AuditRecord::new(
                    record.finding_id.clone(),
                    record.object_locator.clone(),
                    "short_circuit",
                    AuditOutcome::ShortCircuited,
                )
                .with_tier(record.tier)
                .with_detail(format!("existing status {:?}", record.status)),
            )
            .await;
    }
}
