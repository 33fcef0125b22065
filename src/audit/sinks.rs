//! Audit sinks.

use crate::audit::record::AuditRecord;
use crate::core::{AuditError, ObjectLocator};

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Tracing target used for audit events.
pub const AUDIT_TARGET: &str = "pii_responder::audit";

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync + Debug {
    /// Sink name, for diagnostics.
    fn name(&self) -> &str;

    /// Appends one record.
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Highest sequence number this sink holds for `locator`.
    ///
    /// Sinks that cannot read back return `Ok(None)`.
    async fn last_sequence(&self, _locator: &ObjectLocator) -> Result<Option<u64>, AuditError> {
        Ok(None)
    }
}

/// Emits records as structured `tracing` events on [`AUDIT_TARGET`].
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Creates the sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: AUDIT_TARGET,
            audit_id = %record.id,
            sequence = record.sequence,
            finding_id = %record.finding_id,
            object = %record.object_locator,
            action = %record.action,
            outcome = %record.outcome,
            tier = ?record.tier,
            detail = ?record.detail,
            "Audit record"
        );
        Ok(())
    }
}

/// Appends records as JSON lines to a file.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesAuditSink {
    /// Creates a sink appending to `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Reads every record back from the file.
    pub async fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(AuditError::from))
            .collect()
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn last_sequence(&self, locator: &ObjectLocator) -> Result<Option<u64>, AuditError> {
        let _guard = self.write_lock.lock().await;
        Ok(self
            .read_all()
            .await?
            .iter()
            .filter(|r| &r.object_locator == locator)
            .map(|r| r.sequence)
            .max())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    failures: AtomicU32,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` appends fail.
    pub fn fail_next(&self, times: u32) {
        self.failures.store(times, Ordering::SeqCst);
    }

    /// All records, in append order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Records with the given action name.
    pub fn records_for_action(&self, action: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AuditError::SinkUnavailable {
                reason: "injected failure".into(),
            });
        }

        self.records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn last_sequence(&self, locator: &ObjectLocator) -> Result<Option<u64>, AuditError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|r| &r.object_locator == locator)
            .map(|r| r.sequence)
            .max())
    }
}
