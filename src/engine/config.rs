//! Engine wiring options.

use crate::dispatch::RetryConfig;

use std::time::Duration;

/// Configuration for the response engine.
///
/// Runtime policy (thresholds, action plans, retention) comes from the
/// [`ConfigProvider`](crate::config::ConfigProvider); these options only shape
/// how the engine runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum findings processed concurrently.
    pub max_concurrent: usize,

    /// Time budget for one dispatch attempt.
    pub execution_budget: Duration,

    /// Backoff between dispatch attempts of a failed record.
    pub retry: RetryConfig,

    /// How long a delivery's status is remembered for deduplication.
    pub dedupe_window: Duration,

    /// Maximum number of keys held by the dedupe window.
    pub dedupe_capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            execution_budget: Duration::from_secs(60),
            retry: RetryConfig::default(),
            dedupe_window: Duration::from_secs(24 * 60 * 60),
            dedupe_capacity: 100_000,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count. Zero is treated as one.
    pub fn with_max_concurrent(mut self, workers: usize) -> Self {
        self.max_concurrent = workers.max(1);
        self
    }

    /// Sets the per-attempt execution budget.
    pub fn with_execution_budget(mut self, budget: Duration) -> Self {
        self.execution_budget = budget;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the dedupe window length.
    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    /// Sets the dedupe window capacity.
    pub fn with_dedupe_capacity(mut self, capacity: u64) -> Self {
        self.dedupe_capacity = capacity;
        self
    }
}
