//! Ordered, retrying audit logger.

use crate::audit::record::AuditRecord;
use crate::audit::sinks::{AuditSink, TracingAuditSink};
use crate::core::ObjectLocator;
use crate::dispatch::{retry_async, RetryConfig};

use chrono::Utc;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How long an object's sequence counter is kept after its last record.
pub const DEFAULT_SEQUENCE_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// Appends [`AuditRecord`]s to every configured sink.
///
/// Records for the same object are serialized and numbered with a per-object
/// sequence. Failed appends are retried; a record that still cannot be
/// written is dropped with a warning and never fails the caller.
///
/// Counters of idle objects are evicted. A counter is (re)seeded from the
/// highest sequence any sink reports for the object, so numbering continues
/// across restarts when a readable sink such as the JSON-lines file is
/// configured.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
    retry: RetryConfig,
    sequences: Cache<ObjectLocator, Arc<Mutex<Option<u64>>>>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new().with_sink(Arc::new(TracingAuditSink::new()))
    }
}

fn sequence_cache(idle: Duration) -> Cache<ObjectLocator, Arc<Mutex<Option<u64>>>> {
    Cache::builder().time_to_idle(idle).build()
}

impl AuditLogger {
    /// Creates a logger with no sinks.
    pub fn new() -> Self {
        Self {
            sinks: Vec::new(),
            retry: RetryConfig::default(),
            sequences: sequence_cache(DEFAULT_SEQUENCE_IDLE),
        }
    }

    /// Adds a sink.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sets the retry policy for failed appends.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how long an idle object's counter is kept in memory.
    pub fn with_sequence_idle(mut self, idle: Duration) -> Self {
        self.sequences = sequence_cache(idle);
        self
    }

    /// Appends a record, returning whether every sink accepted it.
    pub async fn log(&self, mut record: AuditRecord) -> bool {
        let lock = self
            .sequences
            .get_with(record.object_locator.clone(), || Arc::new(Mutex::new(None)));

        let mut sequence = lock.lock().await;
        let last = match *sequence {
            Some(last) => last,
            None => self.seed(&record.object_locator).await,
        };
        *sequence = Some(last + 1);
        record.sequence = last + 1;
        record.timestamp = Utc::now();

        let mut delivered = true;
        for sink in &self.sinks {
            let result = retry_async(
                &self.retry,
                &record.finding_id,
                None,
                |_| true,
                || sink.append(&record),
            )
            .await;
            if let Err(e) = result {
                delivered = false;
                tracing::warn!(
                    sink = sink.name(),
                    finding_id = %record.finding_id,
                    object = %record.object_locator,
                    action = %record.action,
                    error = %e,
                    "Dropping audit record after retries"
                );
            }
        }
        delivered
    }

    async fn seed(&self, locator: &ObjectLocator) -> u64 {
        let mut last = 0;
        for sink in &self.sinks {
            match sink.last_sequence(locator).await {
                Ok(Some(seq)) => last = last.max(seq),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    sink = sink.name(),
                    object = %locator,
                    error = %e,
                    "Could not read last audit sequence"
                ),
            }
        }
        last
    }

    /// Last sequence number assigned for `locator` while its counter is held.
    pub async fn last_sequence(&self, locator: &ObjectLocator) -> u64 {
        match self.sequences.get(locator) {
            Some(lock) => {
                let held = *lock.lock().await;
                held.unwrap_or(0)
            }
            None => 0,
        }
    }

    /// Number of objects whose counter is held in memory.
    pub fn tracked_objects(&self) -> u64 {
        self.sequences.run_pending_tasks();
        self.sequences.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::AuditOutcome;
    use crate::audit::sinks::{JsonLinesAuditSink, MemoryAuditSink};

    fn record(key: &str, action: &str) -> AuditRecord {
        AuditRecord::new(
            "f-1",
            ObjectLocator::new("media", key),
            action,
            AuditOutcome::Succeeded,
        )
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_per_object_sequence() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::new().with_sink(sink.clone());

        logger.log(record("a", "quarantine")).await;
        logger.log(record("b", "log")).await;
        logger.log(record("a", "tag")).await;

        let seqs: Vec<_> = sink
            .records()
            .iter()
            .map(|r| (r.object_locator.key.clone(), r.sequence))
            .collect();
        assert_eq!(
            seqs,
            vec![("a".into(), 1), ("b".into(), 1), ("a".into(), 2)]
        );
        assert_eq!(logger.last_sequence(&ObjectLocator::new("media", "a")).await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_ordered() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::new().with_sink(sink.clone());

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let logger = logger.clone();
                tokio::spawn(async move { logger.log(record("a", &format!("step-{}", i))).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let seqs: Vec<u64> = sink.records().iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_next(2);
        let logger = AuditLogger::new()
            .with_sink(sink.clone())
            .with_retry(fast_retry());

        assert!(logger.log(record("a", "quarantine")).await);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_idle_counter_evicted_and_reseeded() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::new()
            .with_sink(sink.clone())
            .with_sequence_idle(Duration::from_millis(50));

        logger.log(record("a", "quarantine")).await;
        logger.log(record("a", "tag")).await;
        assert_eq!(logger.tracked_objects(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(logger.tracked_objects(), 0);

        logger.log(record("a", "review_cleared")).await;
        let seqs: Vec<u64> = sink.records().iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sequence_continues_after_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let before = AuditLogger::new().with_sink(Arc::new(JsonLinesAuditSink::new(path.clone())));
        before.log(record("a", "quarantine")).await;
        before.log(record("a", "tag")).await;

        let sink = Arc::new(JsonLinesAuditSink::new(path.clone()));
        let after = AuditLogger::new().with_sink(sink.clone());
        after.log(record("a", "review_confirmed")).await;
        after.log(record("b", "log")).await;

        let seqs: Vec<(String, u64)> = sink
            .read_all()
            .await
            .unwrap()
            .iter()
            .map(|r| (r.object_locator.key.clone(), r.sequence))
            .collect();
        assert_eq!(
            seqs,
            vec![
                ("a".into(), 1),
                ("a".into(), 2),
                ("a".into(), 3),
                ("b".into(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_drops_record() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_next(10);
        let logger = AuditLogger::new()
            .with_sink(sink.clone())
            .with_retry(fast_retry());

        assert!(!logger.log(record("a", "quarantine")).await);
        assert!(sink.records().is_empty());
    }
}
