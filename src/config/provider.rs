//! TTL-cached configuration provider.

use crate::config::settings::Config;
use crate::config::store::ConfigStore;
use crate::core::ConfigError;

use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Where a served snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Freshly loaded from the store during this call.
    Refreshed,
    /// Served from cache within its TTL.
    Cached,
    /// The store failed; the last good snapshot is served past its TTL.
    LastKnownGood,
    /// The store failed and nothing was ever loaded.
    RestrictiveDefaults,
}

#[derive(Debug)]
struct CacheState {
    good: Option<(Arc<Config>, Instant)>,
    last_failure: Option<Instant>,
}

/// Supplies [`Config`] snapshots, cached with a TTL.
///
/// On refresh failure the provider keeps serving the last good snapshot.
/// When no snapshot was ever loaded it serves [`Config::most_restrictive`].
/// After a failure, refreshes are not re-attempted for `failure_backoff`.
#[derive(Debug)]
pub struct ConfigProvider {
    store: Arc<dyn ConfigStore>,
    namespace: String,
    ttl: Duration,
    failure_backoff: Duration,
    state: RwLock<CacheState>,
    refresh_lock: tokio::sync::Mutex<()>,
    restrictive: Arc<Config>,
}

impl ConfigProvider {
    /// Creates a provider reading `namespace` from `store`.
    pub fn new(store: Arc<dyn ConfigStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl: Duration::from_secs(300),
            failure_backoff: Duration::from_secs(5),
            state: RwLock::new(CacheState {
                good: None,
                last_failure: None,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            restrictive: Arc::new(Config::most_restrictive()),
        }
    }

    /// Sets the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets how long to wait before retrying a failed refresh.
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    /// Returns the namespace this provider reads.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the current snapshot.
    pub async fn snapshot(&self) -> Arc<Config> {
        self.snapshot_with_source().await.0
    }

    /// Returns the current snapshot and where it came from.
    pub async fn snapshot_with_source(&self) -> (Arc<Config>, ConfigSource) {
        if let Some(fresh) = self.fresh_cached() {
            return (fresh, ConfigSource::Cached);
        }

        let _guard = self.refresh_lock.lock().await;

        // another caller may have refreshed while we waited
        if let Some(fresh) = self.fresh_cached() {
            return (fresh, ConfigSource::Cached);
        }

        if self.in_failure_backoff() {
            return self.fallback();
        }

        match self.refresh().await {
            Ok(config) => (config, ConfigSource::Refreshed),
            Err(e) => {
                tracing::warn!(
                    namespace = %self.namespace,
                    error = %e,
                    "Configuration refresh failed, serving fallback"
                );
                self.write_state().last_failure = Some(Instant::now());
                self.fallback()
            }
        }
    }

    /// Forces a reload from the store.
    ///
    /// # Errors
    ///
    /// Returns the store or parse error; the cached snapshot is left untouched.
    pub async fn refresh(&self) -> Result<Arc<Config>, ConfigError> {
        let entries = self.store.get_by_path(&self.namespace).await?;
        let config = Arc::new(Config::from_entries(&entries)?);

        let mut state = self.write_state();
        state.good = Some((Arc::clone(&config), Instant::now()));
        state.last_failure = None;

        tracing::debug!(
            namespace = %self.namespace,
            entries = entries.len(),
            "Configuration refreshed"
        );
        Ok(config)
    }

    fn fresh_cached(&self) -> Option<Arc<Config>> {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .good
            .as_ref()
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl)
            .map(|(config, _)| Arc::clone(config))
    }

    fn in_failure_backoff(&self) -> bool {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .last_failure
            .map(|at| at.elapsed() < self.failure_backoff)
            .unwrap_or(false)
    }

    fn fallback(&self) -> (Arc<Config>, ConfigSource) {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match &state.good {
            Some((config, _)) => (Arc::clone(config), ConfigSource::LastKnownGood),
            None => (Arc::clone(&self.restrictive), ConfigSource::RestrictiveDefaults),
        }
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
