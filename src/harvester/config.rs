//! Harvest configuration and retry backoff

use super::{HarvestError, HarvestResult};
use crate::fetcher::AtlasConfig;
use crate::TARGET_SAMPLE_COUNT;
use std::path::PathBuf;
use std::time::Duration;

/// Wait between whole-batch retries.
/// Long enough for a flapping upstream to recover; the batch resumes from the
/// sample logs, so a slow retry costs wall time only.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound for exponential backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// How far back measurement results are requested.
/// One day of a ping measurement at the default 240s interval is ~360 results
/// per probe, close to the per-pair target.
pub const DEFAULT_RESULTS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Requests allowed per rate limit window, shared by all workers.
pub const DEFAULT_REQUESTS_PER_WINDOW: usize = 20;

/// Rate limit window length.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(1);

/// Backoff for retry `attempt` (0-based), doubling from `initial` up to `max`
pub fn calculate_backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Whole-batch retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap for exponential growth
    pub max_backoff: Duration,
    /// Double the delay after each failed attempt
    pub exponential: bool,
    /// Give up after this many retries; `None` retries forever
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Same delay before every retry, unlimited retries
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_backoff: interval,
            max_backoff: interval,
            exponential: false,
            max_retries: None,
        }
    }

    /// Doubling delay capped at `max`, unlimited retries
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial_backoff: initial,
            max_backoff: max.max(initial),
            exponential: true,
            max_retries: None,
        }
    }

    /// Limit the number of retries
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        if self.exponential {
            calculate_backoff(self.initial_backoff, self.max_backoff, retry.saturating_sub(1))
        } else {
            self.initial_backoff
        }
    }

    /// Whether retry number `retry` (1-based) may run
    pub fn allows(&self, retry: u32) -> bool {
        self.max_retries.map_or(true, |max| retry <= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_INTERVAL)
    }
}

/// Complete harvest configuration
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Directory holding one sample log per destination
    pub output_dir: PathBuf,
    /// Anchor list cache file
    pub anchor_cache: PathBuf,
    /// Concurrent destination workers
    pub workers: usize,
    /// Samples wanted per (destination, source) pair
    pub target_samples: usize,
    /// How far back results are requested
    pub results_window: Duration,
    /// Whole-batch retry policy
    pub retry: RetryPolicy,
    /// Upstream API settings
    pub atlas: AtlasConfig,
    /// Requests per rate window across all workers
    pub requests_per_window: usize,
    /// Rate limit window
    pub rate_window: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/ping_times"),
            anchor_cache: PathBuf::from("data/anchors.csv"),
            workers: default_workers(),
            target_samples: TARGET_SAMPLE_COUNT,
            results_window: DEFAULT_RESULTS_WINDOW,
            retry: RetryPolicy::default(),
            atlas: AtlasConfig::default(),
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

impl HarvestConfig {
    /// Reject settings the harvester cannot run with
    pub fn validate(&self) -> HarvestResult<()> {
        if self.workers == 0 {
            return Err(HarvestError::Config("workers must be at least 1".into()));
        }
        if self.target_samples == 0 {
            return Err(HarvestError::Config("target samples must be at least 1".into()));
        }
        if self.results_window.is_zero() {
            return Err(HarvestError::Config("results window must be positive".into()));
        }
        if self.rate_window.is_zero() {
            return Err(HarvestError::Config("rate window must be positive".into()));
        }
        Ok(())
    }
}

/// Worker count matching the available parallelism
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
