//! Configuration for the sync engine.

use std::time::Duration;

/// Default number of records requested per page.
const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default base delay for linear backoff.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1500);

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of records requested per page.
    ///
    /// Pass-through constant for the upstream pagination parameter; the
    /// engine never computes it. Also the threshold for short-page
    /// termination.
    pub page_size: u32,
    /// Per-page retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default page size and retry policy.
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for per-page retry behavior.
///
/// A page is attempted up to `max_attempts` times; after the n-th failure
/// the engine waits `base_delay * n` before the next attempt (linear
/// backoff). A retried page never advances the page counter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per page.
    pub max_attempts: u32,
    /// Base delay for linear backoff.
    pub base_delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration with the default base delay.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Creates a configuration with no retries (single attempt per page).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before the next attempt, given how many attempts have failed
    /// so far.
    pub fn delay_after_failure(&self, failures: u32) -> Duration {
        self.base_delay * failures
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
