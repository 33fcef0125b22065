//! Runtime policy configuration.
//!
//! [`ConfigProvider`] owns the configuration and hands out immutable
//! [`Config`] snapshots. Snapshots are cached with a TTL and refreshed
//! from a [`ConfigStore`]; refresh failures fall back to the last good
//! snapshot, or to [`Config::most_restrictive`] when none exists.

mod provider;
mod settings;
mod store;

pub use provider::{ConfigProvider, ConfigSource};
pub use settings::{Config, ExpiryAction, RemovalPolicy, SeverityThresholds};
pub use store::{namespace, ConfigStore, InMemoryConfigStore, TomlConfigStore};
