//! Backoff for store, audit and alert operations.
//!
//! Delays double from `initial_delay` up to `max_delay`. With jitter on, each
//! delay is scaled into `[0.5, 1.0)` by a BLAKE3 hash of a caller-chosen salt
//! (usually the finding id) and the attempt number: retries of different
//! findings spread out, while one finding's schedule is reproducible.
//!
//! Every retry loop can carry a deadline. A retry whose delay would not end
//! before the deadline is not attempted; the last error is returned instead.

use std::time::Duration;
use tokio::time::Instant;

/// Retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Scale delays by the salted hash.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Three attempts, 200ms doubling to at most 5s, with jitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts (at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns whether another attempt is allowed after `failures` failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }

    /// Delay before the retry that follows `failures` failures.
    pub fn delay(&self, failures: u32, salt: &str) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let doublings = (failures - 1).min(16);
        let base = self
            .initial_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay);
        if !self.jitter {
            return base;
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(salt.as_bytes());
        hasher.update(&failures.to_le_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        let unit = (u64::from_le_bytes(word) >> 11) as f64 / (1u64 << 53) as f64;
        base.mul_f64(0.5 + unit * 0.5)
    }

    /// Delay before the next retry, or `None` if attempts are used up or the
    /// retry could not start before `deadline`.
    pub fn next_delay(
        &self,
        failures: u32,
        salt: &str,
        deadline: Option<Instant>,
    ) -> Option<Duration> {
        if !self.should_retry(failures) {
            return None;
        }
        let delay = self.delay(failures, salt);
        match deadline {
            Some(deadline) if Instant::now() + delay >= deadline => None,
            _ => Some(delay),
        }
    }
}

/// Runs `operation` until it succeeds, `retryable` rejects its error, the
/// attempts run out or the next retry would miss `deadline`.
pub async fn retry_async<F, Fut, T, E, R>(
    config: &RetryConfig,
    salt: &str,
    deadline: Option<Instant>,
    mut retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(&E) -> bool,
{
    let mut failures = 0;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        failures += 1;
        if !retryable(&error) {
            return Err(error);
        }
        let Some(delay) = config.next_delay(failures, salt, deadline) else {
            return Err(error);
        };
        tracing::debug!(
            attempt = failures,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying operation"
        );
        tokio::time::sleep(delay).await;
    }
}
