//! The quarantine protocol.
//!
//! Objects move into quarantine by copy, verify, then remove:
//!
//! 1. If the destination already carries the marker tag, skip to verification.
//! 2. Copy the original to `<prefix><key>` with a "must not exist" precondition,
//!    private access and the marker tags.
//! 3. Compare integrity tokens of source and copy.
//! 4. Only after a match, delete the original or replace it with a tombstone.
//! 5. Record the ledger entry.
//!
//! Every step is safe to repeat, so an invocation interrupted anywhere can be
//! retried without losing the original or duplicating the entry.

use crate::config::{Config, RemovalPolicy};
use crate::core::{
    ObjectLocator, QuarantineError, ResponseError, ResponseResult, SeverityTier, StoreError,
};
use crate::quarantine::entry::{QuarantineEntry, ReviewStatus};
use crate::quarantine::ledger::QuarantineLedger;
use crate::quarantine::store::{AccessControl, CopyOptions, ObjectHead, ObjectStore, StoredObject, Tags};

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Marker tag present on every quarantine copy.
pub const MARKER_TAG: &str = "pii-quarantined";
/// Tag naming the finding that caused the quarantine.
pub const FINDING_ID_TAG: &str = "finding-id";
/// Tag holding the tier at quarantine time.
pub const SEVERITY_TAG: &str = "severity";
/// Tag holding the original `container/key`.
pub const ORIGINAL_LOCATOR_TAG: &str = "original-locator";
/// Tag holding the RFC 3339 quarantine time.
pub const QUARANTINED_AT_TAG: &str = "quarantined-at";
/// Tag marking a tombstone left in place of a removed original.
pub const TOMBSTONE_TAG: &str = "pii-tombstone";
/// Tag on a tombstone pointing at the quarantine copy.
pub const QUARANTINE_LOCATION_TAG: &str = "quarantine-location";

const QUARANTINE_TAGS: [&str; 5] = [
    MARKER_TAG,
    FINDING_ID_TAG,
    SEVERITY_TAG,
    ORIGINAL_LOCATOR_TAG,
    QUARANTINED_AT_TAG,
];

/// Result of a quarantine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarantineOutcome {
    /// The ledger entry, as stored.
    pub entry: QuarantineEntry,
    /// True if this invocation wrote the copy; false for a verification-only pass.
    pub copied: bool,
}

/// A human review decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    /// False positive: restore the object to its original location.
    Cleared,
    /// Confirmed PII: keep the object in quarantine.
    Confirmed,
}

/// Executes the quarantine protocol against an [`ObjectStore`] and records
/// the result in a [`QuarantineLedger`].
#[derive(Debug, Clone)]
pub struct QuarantineManager {
    store: Arc<dyn ObjectStore>,
    ledger: Arc<dyn QuarantineLedger>,
}

fn is_marked(head: &ObjectHead) -> bool {
    head.tags.get(MARKER_TAG).map(String::as_str) == Some("true")
}

fn is_tombstone(head: &ObjectHead) -> bool {
    head.tags.get(TOMBSTONE_TAG).map(String::as_str) == Some("true")
}

fn store_error(locator: &ObjectLocator) -> impl FnOnce(StoreError) -> ResponseError + '_ {
    move |e| ResponseError::from_store(e, locator)
}

impl QuarantineManager {
    /// Creates a manager.
    pub fn new(store: Arc<dyn ObjectStore>, ledger: Arc<dyn QuarantineLedger>) -> Self {
        Self { store, ledger }
    }

    /// The object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<dyn QuarantineLedger> {
        &self.ledger
    }

    /// Moves `original` into quarantine.
    ///
    /// # Errors
    ///
    /// - `ObjectMissing` if neither the original nor a quarantine copy exists.
    /// - `IntegrityMismatch` if the copy differs from the source; a corrupt copy
    ///   written for this finding is removed so a retry copies again.
    /// - `TransientStorage` / `Permission` from the store.
    pub async fn quarantine(
        &self,
        finding_id: &str,
        original: &ObjectLocator,
        tier: SeverityTier,
        config: &Config,
    ) -> ResponseResult<QuarantineOutcome> {
        let destination = original.under_prefix(&config.quarantine_prefix);

        let source_head = self
            .store
            .head(original)
            .await
            .map_err(store_error(original))?
            .filter(|h| !is_tombstone(h));
        let mut dest_head = self
            .store
            .head(&destination)
            .await
            .map_err(store_error(&destination))?;

        let marked = match &dest_head {
            Some(head) if is_marked(head) => true,
            Some(_) => {
                return Err(ResponseError::internal(format!(
                    "quarantine destination {} is occupied by an unmarked object",
                    destination
                )));
            }
            None => false,
        };

        let mut copied = false;
        if marked {
            tracing::debug!(object = %original, "Quarantine copy present, verifying only");
        } else {
            let Some(source) = &source_head else {
                return Err(ResponseError::ObjectMissing {
                    locator: original.clone(),
                });
            };

            let mut tags = source.tags.clone();
            tags.insert(MARKER_TAG.into(), "true".into());
            tags.insert(FINDING_ID_TAG.into(), finding_id.into());
            tags.insert(SEVERITY_TAG.into(), tier.as_str().into());
            tags.insert(ORIGINAL_LOCATOR_TAG.into(), original.to_string());
            tags.insert(
                QUARANTINED_AT_TAG.into(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );

            let options = CopyOptions::new()
                .with_tags(tags)
                .with_access(AccessControl::Private)
                .if_absent();
            match self.store.copy(original, &destination, options).await {
                Ok(()) => copied = true,
                Err(StoreError::PreconditionFailed { .. }) => {
                    tracing::debug!(object = %original, "Concurrent quarantine won, verifying only");
                }
                Err(StoreError::NotFound { .. }) => {
                    return Err(ResponseError::ObjectMissing {
                        locator: original.clone(),
                    });
                }
                Err(e) => return Err(ResponseError::from_store(e, original)),
            }

            dest_head = self
                .store
                .head(&destination)
                .await
                .map_err(store_error(&destination))?;
        }

        let dest_head = dest_head.ok_or_else(|| ResponseError::TransientStorage {
            operation: "copy",
            locator: destination.clone(),
            reason: "quarantine copy vanished after write".into(),
        })?;

        if source_head.is_some() {
            self.verify_copy(finding_id, original, &destination, &dest_head)
                .await?;
            self.remove_original(original, &destination, config.removal_policy)
                .await?;
        }

        let quarantined_at = dest_head
            .tags
            .get(QUARANTINED_AT_TAG)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let entry = QuarantineEntry::new(
            original.clone(),
            destination.clone(),
            finding_id,
            tier,
            quarantined_at,
            config.retention(),
        );
        let inserted = self.ledger.insert_if_absent(entry.clone()).await?;
        let entry = if inserted {
            entry
        } else {
            self.ledger.get(original).await?.unwrap_or(entry)
        };

        tracing::info!(
            finding_id = %finding_id,
            object = %original,
            quarantine = %destination,
            copied = copied,
            review_deadline = %entry.review_deadline,
            "Object quarantined"
        );

        Ok(QuarantineOutcome { entry, copied })
    }

    async fn verify_copy(
        &self,
        finding_id: &str,
        original: &ObjectLocator,
        destination: &ObjectLocator,
        dest_head: &ObjectHead,
    ) -> ResponseResult<()> {
        let expected = self
            .store
            .integrity_token(original)
            .await
            .map_err(store_error(original))?;
        let actual = self
            .store
            .integrity_token(destination)
            .await
            .map_err(store_error(destination))?;

        if expected.matches(&actual) {
            return Ok(());
        }

        tracing::warn!(
            object = %original,
            expected = %expected,
            actual = %actual,
            "Quarantine copy failed verification"
        );

        // only a copy written for this finding may be discarded
        let owned = dest_head.tags.get(FINDING_ID_TAG).map(String::as_str) == Some(finding_id);
        if owned {
            self.store
                .delete(destination)
                .await
                .map_err(store_error(destination))?;
        }

        Err(ResponseError::IntegrityMismatch {
            locator: destination.clone(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }

    async fn remove_original(
        &self,
        original: &ObjectLocator,
        destination: &ObjectLocator,
        policy: RemovalPolicy,
    ) -> ResponseResult<()> {
        match policy {
            RemovalPolicy::Delete => self.store.delete(original).await,
            RemovalPolicy::Tombstone => {
                let mut tags = Tags::new();
                tags.insert(TOMBSTONE_TAG.into(), "true".into());
                tags.insert(QUARANTINE_LOCATION_TAG.into(), destination.to_string());
                let body = format!("quarantined to {}", destination);
                self.store
                    .put(original, StoredObject::new(body).with_tags(tags))
                    .await
            }
        }
        .map_err(store_error(original))
    }

    /// Where the content of `original` lives now: the original itself, or its
    /// quarantine copy once it has been moved.
    ///
    /// # Errors
    ///
    /// `ObjectMissing` if there is neither a live original nor a marked copy.
    pub async fn locate(
        &self,
        original: &ObjectLocator,
        config: &Config,
    ) -> ResponseResult<ObjectLocator> {
        let head = self
            .store
            .head(original)
            .await
            .map_err(store_error(original))?;
        if head.as_ref().is_some_and(|h| !is_tombstone(h)) {
            return Ok(original.clone());
        }
        if original.is_under(&config.quarantine_prefix) {
            return Err(ResponseError::ObjectMissing {
                locator: original.clone(),
            });
        }

        let destination = original.under_prefix(&config.quarantine_prefix);
        match self
            .store
            .head(&destination)
            .await
            .map_err(store_error(&destination))?
        {
            Some(head) if is_marked(&head) => Ok(destination),
            _ => Err(ResponseError::ObjectMissing {
                locator: original.clone(),
            }),
        }
    }

    /// Sets the quarantine copy's access control to private and confirms it.
    pub async fn restrict_access(&self, quarantined: &ObjectLocator) -> ResponseResult<()> {
        self.store
            .set_access_control(quarantined, AccessControl::Private)
            .await
            .map_err(store_error(quarantined))?;

        let access = self
            .store
            .get_access_control(quarantined)
            .await
            .map_err(store_error(quarantined))?;
        if access != AccessControl::Private {
            return Err(ResponseError::TransientStorage {
                operation: "set_access_control",
                locator: quarantined.clone(),
                reason: format!("access control reads back as {}", access),
            });
        }

        tracing::debug!(object = %quarantined, "Access restricted");
        Ok(())
    }

    /// Applies a review decision to the entry for `original`.
    ///
    /// `Cleared` copies the object back, verifies it, and removes the quarantine
    /// copy before marking the entry cleared.
    pub async fn review(
        &self,
        original: &ObjectLocator,
        decision: ReviewDecision,
    ) -> ResponseResult<QuarantineEntry> {
        let now = Utc::now();
        match decision {
            ReviewDecision::Confirmed => Ok(self
                .ledger
                .update_status(original, ReviewStatus::Confirmed, now)
                .await?),
            ReviewDecision::Cleared => {
                let entry = self.ledger.get(original).await?.ok_or_else(|| {
                    QuarantineError::NotFound {
                        id: original.to_string(),
                    }
                })?;
                if entry.review_status != ReviewStatus::Pending {
                    return Err(QuarantineError::InvalidTransition {
                        id: entry.id(),
                        from: entry.review_status.to_string(),
                        to: ReviewStatus::Cleared.to_string(),
                    }
                    .into());
                }
                self.restore(&entry).await?;
                Ok(self
                    .ledger
                    .update_status(original, ReviewStatus::Cleared, now)
                    .await?)
            }
        }
    }

    async fn restore(&self, entry: &QuarantineEntry) -> ResponseResult<()> {
        let original = &entry.original_locator;
        let quarantined = &entry.quarantine_locator;

        let head = self
            .store
            .head(quarantined)
            .await
            .map_err(store_error(quarantined))?
            .ok_or_else(|| ResponseError::ObjectMissing {
                locator: quarantined.clone(),
            })?;

        let mut tags = head.tags;
        for tag in QUARANTINE_TAGS {
            tags.remove(tag);
        }

        // overwrites the tombstone, if any
        self.store
            .copy(
                quarantined,
                original,
                CopyOptions::new()
                    .with_tags(tags)
                    .with_access(AccessControl::Inherited),
            )
            .await
            .map_err(store_error(original))?;

        let expected = self
            .store
            .integrity_token(quarantined)
            .await
            .map_err(store_error(quarantined))?;
        let actual = self
            .store
            .integrity_token(original)
            .await
            .map_err(store_error(original))?;
        if !expected.matches(&actual) {
            return Err(ResponseError::IntegrityMismatch {
                locator: original.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        self.store
            .delete(quarantined)
            .await
            .map_err(store_error(quarantined))?;

        tracing::info!(object = %original, "Object restored from quarantine");
        Ok(())
    }

    /// Deletes the quarantine copy of an entry.
    pub async fn purge(&self, entry: &QuarantineEntry) -> ResponseResult<()> {
        self.store
            .delete(&entry.quarantine_locator)
            .await
            .map_err(store_error(&entry.quarantine_locator))?;
        tracing::info!(object = %entry.original_locator, "Quarantine copy purged");
        Ok(())
    }
}
