//! Quarantine ledger: the durable list of quarantined objects.

use crate::core::{ObjectLocator, QuarantineError, QuarantineResult};
use crate::quarantine::entry::{QuarantineEntry, QuarantineFilter, ReviewStatus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Storage for [`QuarantineEntry`] records, keyed by original locator.
#[async_trait]
pub trait QuarantineLedger: Send + Sync + Debug {
    /// Inserts `entry` unless an active entry exists for its original locator.
    ///
    /// Returns `true` if the entry was written. Inactive (cleared or expired)
    /// entries are replaced.
    async fn insert_if_absent(&self, entry: QuarantineEntry) -> QuarantineResult<bool>;

    /// Returns the entry for an original locator.
    async fn get(&self, original: &ObjectLocator) -> QuarantineResult<Option<QuarantineEntry>>;

    /// Lists entries matching `filter`, oldest first.
    async fn list(&self, filter: QuarantineFilter) -> QuarantineResult<Vec<QuarantineEntry>>;

    /// Moves an entry to `status`, enforcing valid review transitions.
    async fn update_status(
        &self,
        original: &ObjectLocator,
        status: ReviewStatus,
        at: DateTime<Utc>,
    ) -> QuarantineResult<QuarantineEntry>;

    /// Number of entries, active or not.
    async fn count(&self) -> QuarantineResult<usize> {
        Ok(self.list(QuarantineFilter::new()).await?.len())
    }

    /// Pending entries whose deadline is before `now`.
    async fn overdue(&self, now: DateTime<Utc>) -> QuarantineResult<Vec<QuarantineEntry>> {
        self.list(
            QuarantineFilter::new()
                .with_status(ReviewStatus::Pending)
                .with_deadline_before(now),
        )
        .await
    }
}

fn transition(
    entry: &QuarantineEntry,
    status: ReviewStatus,
    at: DateTime<Utc>,
) -> QuarantineResult<QuarantineEntry> {
    if !entry.review_status.can_transition_to(status) {
        return Err(QuarantineError::InvalidTransition {
            id: entry.id(),
            from: entry.review_status.to_string(),
            to: status.to_string(),
        });
    }
    let mut updated = entry.clone();
    updated.review_status = status;
    updated.reviewed_at = Some(at);
    Ok(updated)
}

/// In-memory ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: RwLock<HashMap<String, QuarantineEntry>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuarantineLedger for InMemoryLedger {
    async fn insert_if_absent(&self, entry: QuarantineEntry) -> QuarantineResult<bool> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let id = entry.id();
        if entries.get(&id).is_some_and(|e| e.review_status.is_active()) {
            return Ok(false);
        }
        entries.insert(id, entry);
        Ok(true)
    }

    async fn get(&self, original: &ObjectLocator) -> QuarantineResult<Option<QuarantineEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&original.to_string())
            .cloned())
    }

    async fn list(&self, filter: QuarantineFilter) -> QuarantineResult<Vec<QuarantineEntry>> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(filter.apply(entries.values()))
    }

    async fn update_status(
        &self,
        original: &ObjectLocator,
        status: ReviewStatus,
        at: DateTime<Utc>,
    ) -> QuarantineResult<QuarantineEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let id = original.to_string();
        let current = entries
            .get(&id)
            .ok_or_else(|| QuarantineError::NotFound { id: id.clone() })?;
        let updated = transition(current, status, at)?;
        entries.insert(id, updated.clone());
        Ok(updated)
    }
}

/// Filesystem ledger.
///
/// Each entry is one JSON document; the in-memory index is rebuilt from the
/// directory when the ledger is opened.
///
/// ```text
/// ledger/
/// └── entries/
///     └── {blake3(original-locator)}.json
/// ```
#[derive(Debug)]
pub struct FilesystemLedger {
    base_path: PathBuf,
    index: RwLock<HashMap<String, QuarantineEntry>>,
}

impl FilesystemLedger {
    /// Opens (creating if needed) a ledger rooted at `base_path`.
    pub fn open(base_path: impl Into<PathBuf>) -> QuarantineResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(base_path.join("entries")).map_err(|e| {
            QuarantineError::StoreFailed {
                reason: format!("failed to create ledger directory: {}", e),
            }
        })?;

        let ledger = Self {
            base_path,
            index: RwLock::new(HashMap::new()),
        };
        ledger.load_index()?;
        Ok(ledger)
    }

    /// Directory holding entry documents.
    pub fn entries_dir(&self) -> PathBuf {
        self.base_path.join("entries")
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        let name = blake3::hash(id.as_bytes()).to_hex();
        self.entries_dir().join(format!("{}.json", name))
    }

    fn load_index(&self) -> QuarantineResult<()> {
        let dir = self.entries_dir();
        let entries = std::fs::read_dir(&dir).map_err(|e| QuarantineError::RetrieveFailed {
            reason: format!("failed to read ledger directory: {}", e),
        })?;

        let mut index = self.index.write().unwrap_or_else(|p| p.into_inner());
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match read_entry(&path) {
                Ok(entry) => {
                    index.insert(entry.id(), entry);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable ledger entry");
                }
            }
        }

        tracing::debug!(count = index.len(), "Loaded quarantine ledger");
        Ok(())
    }

    async fn persist(&self, entry: &QuarantineEntry) -> QuarantineResult<()> {
        let path = self.entry_path(&entry.id());
        let content =
            serde_json::to_vec_pretty(entry).map_err(|e| QuarantineError::StoreFailed {
                reason: format!("failed to serialize entry: {}", e),
            })?;

        // write-then-rename so a crash never leaves a truncated document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| QuarantineError::StoreFailed {
                reason: format!("failed to write entry: {}", e),
            })?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn read_entry(path: &Path) -> QuarantineResult<QuarantineEntry> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| QuarantineError::RetrieveFailed {
        reason: format!("invalid entry document: {}", e),
    })
}

#[async_trait]
impl QuarantineLedger for FilesystemLedger {
    async fn insert_if_absent(&self, entry: QuarantineEntry) -> QuarantineResult<bool> {
        let id = entry.id();
        let previous = {
            let mut index = self.index.write().unwrap_or_else(|p| p.into_inner());
            if index.get(&id).is_some_and(|e| e.review_status.is_active()) {
                return Ok(false);
            }
            index.insert(id.clone(), entry.clone())
        };

        if let Err(e) = self.persist(&entry).await {
            let mut index = self.index.write().unwrap_or_else(|p| p.into_inner());
            match previous {
                Some(prev) => index.insert(id, prev),
                None => index.remove(&id),
            };
            return Err(e);
        }

        tracing::info!(
            original = %entry.original_locator,
            quarantine = %entry.quarantine_locator,
            deadline = %entry.review_deadline,
            "Quarantine entry recorded"
        );
        Ok(true)
    }

    async fn get(&self, original: &ObjectLocator) -> QuarantineResult<Option<QuarantineEntry>> {
        Ok(self
            .index
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&original.to_string())
            .cloned())
    }

    async fn list(&self, filter: QuarantineFilter) -> QuarantineResult<Vec<QuarantineEntry>> {
        let index = self.index.read().unwrap_or_else(|p| p.into_inner());
        Ok(filter.apply(index.values()))
    }

    async fn update_status(
        &self,
        original: &ObjectLocator,
        status: ReviewStatus,
        at: DateTime<Utc>,
    ) -> QuarantineResult<QuarantineEntry> {
        let id = original.to_string();
        let (previous, updated) = {
            let mut index = self.index.write().unwrap_or_else(|p| p.into_inner());
            let current = index
                .get(&id)
                .cloned()
                .ok_or_else(|| QuarantineError::NotFound { id: id.clone() })?;
            let updated = transition(&current, status, at)?;
            index.insert(id.clone(), updated.clone());
            (current, updated)
        };

        if let Err(e) = self.persist(&updated).await {
            self.index
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .insert(id, previous);
            return Err(e);
        }
        Ok(updated)
    }

    async fn count(&self) -> QuarantineResult<usize> {
        Ok(self.index.read().unwrap_or_else(|p| p.into_inner()).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SeverityTier;
    use chrono::Duration;
    use tempfile::TempDir;

    fn entry(key: &str) -> QuarantineEntry {
        QuarantineEntry::new(
            ObjectLocator::new("media", key),
            ObjectLocator::new("media", format!("quarantine/{}", key)),
            "f-1",
            SeverityTier::High,
            Utc::now(),
            Duration::days(90),
        )
    }

    #[tokio::test]
    async fn test_insert_if_absent() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.insert_if_absent(entry("a.csv")).await.unwrap());
        assert!(!ledger.insert_if_absent(entry("a.csv")).await.unwrap());
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inactive_entry_replaced() {
        let ledger = InMemoryLedger::new();
        let loc = ObjectLocator::new("media", "a.csv");
        ledger.insert_if_absent(entry("a.csv")).await.unwrap();
        ledger
            .update_status(&loc, ReviewStatus::Cleared, Utc::now())
            .await
            .unwrap();

        assert!(ledger.insert_if_absent(entry("a.csv")).await.unwrap());
        let current = ledger.get(&loc).await.unwrap().unwrap();
        assert_eq!(current.review_status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_invalid_transition() {
        let ledger = InMemoryLedger::new();
        let loc = ObjectLocator::new("media", "a.csv");
        ledger.insert_if_absent(entry("a.csv")).await.unwrap();
        ledger
            .update_status(&loc, ReviewStatus::Confirmed, Utc::now())
            .await
            .unwrap();

        let result = ledger
            .update_status(&loc, ReviewStatus::Expired, Utc::now())
            .await;
        assert!(matches!(
            result,
            Err(QuarantineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_missing_entry() {
        let ledger = InMemoryLedger::new();
        let result = ledger
            .update_status(&ObjectLocator::new("media", "x"), ReviewStatus::Cleared, Utc::now())
            .await;
        assert!(matches!(result, Err(QuarantineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_filesystem_ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = FilesystemLedger::open(dir.path()).unwrap();
            ledger.insert_if_absent(entry("a.csv")).await.unwrap();
            ledger.insert_if_absent(entry("b.csv")).await.unwrap();
            ledger
                .update_status(
                    &ObjectLocator::new("media", "b.csv"),
                    ReviewStatus::Confirmed,
                    Utc::now(),
                )
                .await
                .unwrap();
        }

        let reopened = FilesystemLedger::open(dir.path()).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        let b = reopened
            .get(&ObjectLocator::new("media", "b.csv"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.review_status, ReviewStatus::Confirmed);
        assert!(!reopened.insert_if_absent(entry("a.csv")).await.unwrap());
    }

    #[tokio::test]
    async fn test_overdue_listing() {
        let ledger = InMemoryLedger::new();
        let mut old = entry("old.csv");
        old.quarantined_at = Utc::now() - Duration::days(120);
        old.review_deadline = old.quarantined_at + Duration::days(90);
        ledger.insert_if_absent(old).await.unwrap();
        ledger.insert_if_absent(entry("new.csv")).await.unwrap();

        let overdue = ledger.overdue(Utc::now()).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].original_locator.key, "old.csv");
    }
}
