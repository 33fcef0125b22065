//! Object store abstraction.
//!
//! Every mutation of customer content goes through [`ObjectStore`]. The
//! quarantine protocol relies on two store guarantees: conditional copies
//! (`CopyOptions::if_absent`) and integrity tokens computed by the store.

use crate::core::{IntegrityToken, ObjectLocator, StoreResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};

/// Object tags, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Access control applied to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessControl {
    /// Readable only by the owning account.
    Private,
    /// Inherits the container's access policy.
    #[default]
    Inherited,
    /// Publicly readable.
    PublicRead,
}

impl fmt::Display for AccessControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Private => "private",
            Self::Inherited => "inherited",
            Self::PublicRead => "public-read",
        };
        f.write_str(s)
    }
}

/// A stored object with its body.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Object body.
    pub body: Vec<u8>,
    /// User metadata, preserved across copies.
    pub metadata: HashMap<String, String>,
    /// Tags.
    pub tags: Tags,
    /// Access control.
    pub access: AccessControl,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    /// Creates an object with default access control and no tags.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            metadata: HashMap::new(),
            tags: Tags::new(),
            access: AccessControl::default(),
            last_modified: Utc::now(),
        }
    }

    /// Sets the tags.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the head of this object.
    pub fn head(&self) -> ObjectHead {
        ObjectHead {
            size: self.body.len() as u64,
            tags: self.tags.clone(),
            access: self.access,
            last_modified: self.last_modified,
        }
    }
}

/// Object attributes without the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHead {
    /// Body size in bytes.
    pub size: u64,
    /// Tags.
    pub tags: Tags,
    /// Access control.
    pub access: AccessControl,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

/// Options for [`ObjectStore::copy`].
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Tags to set on the destination, replacing the source's tags.
    pub tags: Option<Tags>,
    /// Access control for the destination.
    pub access: Option<AccessControl>,
    /// Fail with `PreconditionFailed` if the destination already exists.
    pub if_absent: bool,
}

impl CopyOptions {
    /// Creates options that copy tags and access control unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the destination tags.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Sets the destination access control.
    pub fn with_access(mut self, access: AccessControl) -> Self {
        self.access = Some(access);
        self
    }

    /// Requires that the destination does not exist.
    pub fn if_absent(mut self) -> Self {
        self.if_absent = true;
        self
    }
}

/// Content store holding the objects findings refer to.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Reads an object.
    async fn get(&self, locator: &ObjectLocator) -> StoreResult<StoredObject>;

    /// Reads an object's attributes; `None` if it does not exist.
    async fn head(&self, locator: &ObjectLocator) -> StoreResult<Option<ObjectHead>>;

    /// Copies `source` to `destination`, preserving metadata.
    async fn copy(
        &self,
        source: &ObjectLocator,
        destination: &ObjectLocator,
        options: CopyOptions,
    ) -> StoreResult<()>;

    /// Writes an object, replacing any existing one.
    async fn put(&self, locator: &ObjectLocator, object: StoredObject) -> StoreResult<()>;

    /// Deletes an object. Deleting a missing object succeeds.
    async fn delete(&self, locator: &ObjectLocator) -> StoreResult<()>;

    /// Reads an object's tags.
    async fn get_tags(&self, locator: &ObjectLocator) -> StoreResult<Tags>;

    /// Replaces an object's tags.
    async fn put_tags(&self, locator: &ObjectLocator, tags: Tags) -> StoreResult<()>;

    /// Sets an object's access control.
    async fn set_access_control(
        &self,
        locator: &ObjectLocator,
        access: AccessControl,
    ) -> StoreResult<()>;

    /// Reads an object's access control.
    async fn get_access_control(&self, locator: &ObjectLocator) -> StoreResult<AccessControl>;

    /// Computes the integrity token of an object's body.
    async fn integrity_token(&self, locator: &ObjectLocator) -> StoreResult<IntegrityToken>;

    /// Returns true if the object exists.
    async fn exists(&self, locator: &ObjectLocator) -> StoreResult<bool> {
        Ok(self.head(locator).await?.is_some())
    }
}
