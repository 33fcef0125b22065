//! Configuration store backends.
//!
//! A store exposes hierarchical key-value reads: every key is a `/`-separated
//! path and [`ConfigStore::get_by_path`] returns all keys below a namespace,
//! relative to it.

use crate::core::ConfigError;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

/// Trait for external configuration stores.
#[async_trait]
pub trait ConfigStore: Send + Sync + Debug {
    /// Returns every entry below `namespace`, keyed relative to it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Unavailable` when the store cannot be reached.
    async fn get_by_path(&self, namespace: &str) -> Result<HashMap<String, String>, ConfigError>;
}

/// Builds the environment-scoped namespace, e.g. `/media-pipeline/prod`.
pub fn namespace(project: &str, environment: &str) -> String {
    format!("/{}/{}", project.trim_matches('/'), environment.trim_matches('/'))
}

fn relative_entries<'a>(
    entries: impl Iterator<Item = (&'a String, &'a String)>,
    namespace: &str,
) -> HashMap<String, String> {
    let prefix = format!("{}/", namespace.trim_end_matches('/'));
    entries
        .filter_map(|(k, v)| {
            k.strip_prefix(&prefix)
                .map(|rel| (rel.to_string(), v.clone()))
        })
        .collect()
}

/// In-memory configuration store.
///
/// Availability can be toggled to simulate an unreachable store.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    entries: RwLock<HashMap<String, String>>,
    unavailable: AtomicBool,
    reads: AtomicU64,
}

impl InMemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry at an absolute path.
    pub fn with_entry(self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(path, value);
        self
    }

    /// Sets an entry at an absolute path.
    pub fn set(&self, path: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.into(), value.into());
    }

    /// Makes subsequent reads fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Returns the number of reads served or refused.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_by_path(&self, namespace: &str) -> Result<HashMap<String, String>, ConfigError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConfigError::Unavailable {
                reason: "in-memory store marked unavailable".into(),
            });
        }

        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(relative_entries(entries.iter(), namespace))
    }
}

/// Configuration store backed by a TOML file.
///
/// Nested tables are flattened into `/`-separated paths, so
///
/// ```toml
/// [media-pipeline.prod.quarantine]
/// retention_days = 30
/// ```
///
/// is read as `/media-pipeline/prod/quarantine/retention_days = "30"`.
/// The file is re-read on every call so edits are picked up at the next
/// cache refresh.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    /// Creates a store reading the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn flatten(prefix: &str, value: &toml::Value, out: &mut HashMap<String, String>) {
        match value {
            toml::Value::Table(table) => {
                for (k, v) in table {
                    Self::flatten(&format!("{}/{}", prefix, k), v, out);
                }
            }
            toml::Value::String(s) => {
                out.insert(prefix.to_string(), s.clone());
            }
            toml::Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        toml::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                out.insert(prefix.to_string(), joined);
            }
            other => {
                out.insert(prefix.to_string(), other.to_string());
            }
        }
    }
}

#[async_trait]
impl ConfigStore for TomlConfigStore {
    async fn get_by_path(&self, namespace: &str) -> Result<HashMap<String, String>, ConfigError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::Unavailable {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;
        let root: toml::Value = toml::from_str(&content)?;

        let mut flat = HashMap::new();
        Self::flatten("", &root, &mut flat);
        Ok(relative_entries(flat.iter(), namespace))
    }
}
