//! In-memory object store with fault injection.
//!
//! Used by tests and demos to exercise the quarantine protocol against
//! failures: any operation can be made to fail a number of times, copies
//! can be corrupted, and every call is counted.

use crate::core::{ContentHasher, IntegrityToken, ObjectLocator, StoreError, StoreResult};
use crate::quarantine::store::{
    AccessControl, CopyOptions, ObjectHead, ObjectStore, StoredObject, Tags,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Operations of [`ObjectStore`], for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `get`
    Get,
    /// `head`
    Head,
    /// `copy`
    Copy,
    /// `put`
    Put,
    /// `delete`
    Delete,
    /// `get_tags`
    GetTags,
    /// `put_tags`
    PutTags,
    /// `set_access_control`
    SetAccess,
    /// `get_access_control`
    GetAccess,
    /// `integrity_token`
    Integrity,
}

impl StoreOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Head => "head",
            Self::Copy => "copy",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::GetTags => "get_tags",
            Self::PutTags => "put_tags",
            Self::SetAccess => "set_access_control",
            Self::GetAccess => "get_access_control",
            Self::Integrity => "integrity_token",
        }
    }
}

/// Kind of injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Retryable unavailability.
    Unavailable,
    /// Fatal permission denial.
    PermissionDenied,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFault {
    fault: Fault,
    remaining: u32,
}

/// In-memory [`ObjectStore`].
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectLocator, StoredObject>>,
    faults: Mutex<HashMap<StoreOp, InjectedFault>>,
    calls: Mutex<HashMap<StoreOp, u64>>,
    corrupt_copies: AtomicU32,
    latency: Option<Duration>,
    hasher: ContentHasher,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object.
    pub fn with_object(self, locator: ObjectLocator, object: StoredObject) -> Self {
        self.insert(locator, object);
        self
    }

    /// Reports a SHA-256 checksum alongside BLAKE3, the way stores with
    /// native checksums do.
    pub fn with_native_sha256(mut self) -> Self {
        self.hasher = self.hasher.with_sha256(true);
        self
    }

    /// Delays every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Inserts or replaces an object directly, bypassing faults and counters.
    pub fn insert(&self, locator: ObjectLocator, object: StoredObject) {
        self.objects
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(locator, object);
    }

    /// Returns a copy of an object, bypassing faults and counters.
    pub fn object(&self, locator: &ObjectLocator) -> Option<StoredObject> {
        self.objects
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(locator)
            .cloned()
    }

    /// Returns true if the object exists.
    pub fn contains(&self, locator: &ObjectLocator) -> bool {
        self.object(locator).is_some()
    }

    /// Returns every locator in the store, sorted.
    pub fn locators(&self) -> Vec<ObjectLocator> {
        let mut all: Vec<_> = self
            .objects
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        all.sort();
        all
    }

    /// Makes the next `times` calls of `op` fail with `fault`.
    pub fn fail_next(&self, op: StoreOp, fault: Fault, times: u32) {
        self.faults
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(op, InjectedFault { fault, remaining: times });
    }

    /// Makes every call of `op` fail with `fault` until cleared.
    pub fn fail_always(&self, op: StoreOp, fault: Fault) {
        self.fail_next(op, fault, u32::MAX);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.faults.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.corrupt_copies.store(0, Ordering::SeqCst);
    }

    /// Corrupts the body written by the next `times` copies.
    pub fn corrupt_next_copies(&self, times: u32) {
        self.corrupt_copies.store(times, Ordering::SeqCst);
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn call_count(&self, op: StoreOp) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, op: StoreOp, locator: &ObjectLocator) -> StoreResult<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(op)
            .or_insert(0) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.faults.lock().unwrap_or_else(|p| p.into_inner());
        let Some(injected) = faults.get_mut(&op) else {
            return Ok(());
        };
        let fault = injected.fault;
        if injected.remaining != u32::MAX {
            injected.remaining -= 1;
        }
        if injected.remaining == 0 {
            faults.remove(&op);
        }

        tracing::debug!(op = op.name(), object = %locator, fault = ?fault, "Injected store fault");
        Err(match fault {
            Fault::Unavailable => StoreError::unavailable(op.name(), "injected fault"),
            Fault::PermissionDenied => StoreError::PermissionDenied {
                operation: op.name(),
                locator: locator.clone(),
            },
        })
    }

    fn read_object(&self, locator: &ObjectLocator) -> StoreResult<StoredObject> {
        self.object(locator).ok_or_else(|| StoreError::NotFound {
            locator: locator.clone(),
        })
    }

    fn update<F>(&self, locator: &ObjectLocator, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut StoredObject),
    {
        let mut objects = self.objects.write().unwrap_or_else(|p| p.into_inner());
        let object = objects.get_mut(locator).ok_or_else(|| StoreError::NotFound {
            locator: locator.clone(),
        })?;
        f(object);
        object.last_modified = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, locator: &ObjectLocator) -> StoreResult<StoredObject> {
        self.enter(StoreOp::Get, locator).await?;
        self.read_object(locator)
    }

    async fn head(&self, locator: &ObjectLocator) -> StoreResult<Option<ObjectHead>> {
        self.enter(StoreOp::Head, locator).await?;
        Ok(self.object(locator).map(|o| o.head()))
    }

    async fn copy(
        &self,
        source: &ObjectLocator,
        destination: &ObjectLocator,
        options: CopyOptions,
    ) -> StoreResult<()> {
        self.enter(StoreOp::Copy, source).await?;

        let mut objects = self.objects.write().unwrap_or_else(|p| p.into_inner());
        let mut copy = objects
            .get(source)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                locator: source.clone(),
            })?;

        if options.if_absent && objects.contains_key(destination) {
            return Err(StoreError::PreconditionFailed {
                locator: destination.clone(),
            });
        }

        if let Some(tags) = options.tags {
            copy.tags = tags;
        }
        if let Some(access) = options.access {
            copy.access = access;
        }
        copy.last_modified = Utc::now();

        let corrupt = self
            .corrupt_copies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if corrupt {
            copy.body.push(0xFF);
        }

        objects.insert(destination.clone(), copy);
        Ok(())
    }

    async fn put(&self, locator: &ObjectLocator, mut object: StoredObject) -> StoreResult<()> {
        self.enter(StoreOp::Put, locator).await?;
        object.last_modified = Utc::now();
        self.insert(locator.clone(), object);
        Ok(())
    }

    async fn delete(&self, locator: &ObjectLocator) -> StoreResult<()> {
        self.enter(StoreOp::Delete, locator).await?;
        self.objects
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(locator);
        Ok(())
    }

    async fn get_tags(&self, locator: &ObjectLocator) -> StoreResult<Tags> {
        self.enter(StoreOp::GetTags, locator).await?;
        Ok(self.read_object(locator)?.tags)
    }

    async fn put_tags(&self, locator: &ObjectLocator, tags: Tags) -> StoreResult<()> {
        self.enter(StoreOp::PutTags, locator).await?;
        self.update(locator, |o| o.tags = tags)
    }

    async fn set_access_control(
        &self,
        locator: &ObjectLocator,
        access: AccessControl,
    ) -> StoreResult<()> {
        self.enter(StoreOp::SetAccess, locator).await?;
        self.update(locator, |o| o.access = access)
    }

    async fn get_access_control(&self, locator: &ObjectLocator) -> StoreResult<AccessControl> {
        self.enter(StoreOp::GetAccess, locator).await?;
        Ok(self.read_object(locator)?.access)
    }

    async fn integrity_token(&self, locator: &ObjectLocator) -> StoreResult<IntegrityToken> {
        self.enter(StoreOp::Integrity, locator).await?;
        let object = self.read_object(locator)?;
        Ok(self.hasher.hash_bytes(&object.body))
    }
}
