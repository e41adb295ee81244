//! Harvest command and shared command line options

use crate::fetcher::atlas_config::DEFAULT_BASE_URL;
use crate::fetcher::AtlasConfig;
use crate::harvester::config::{
    DEFAULT_RATE_WINDOW, DEFAULT_REQUESTS_PER_WINDOW, DEFAULT_RETRY_INTERVAL, MAX_BACKOFF,
};
use crate::harvester::{HarvestConfig, HarvestSummary, Harvester, RetryPolicy};
use crate::shutdown::SharedShutdown;
use crate::TARGET_SAMPLE_COUNT;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use super::CliError;

/// Upper bound on workers; more only queue on the shared rate limiter
const MAX_WORKERS: usize = 64;

/// Upper bound on the results window, ten years
const MAX_RESULTS_WINDOW_HOURS: u64 = 87_600;

/// Upper bound on the request rate
const MAX_REQUESTS_PER_SECOND: usize = 1000;

/// Parse and validate the worker count
fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Parse and validate the request rate
fn parse_request_rate(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(1..=MAX_REQUESTS_PER_SECOND).contains(&value) {
        return Err(format!(
            "request rate must be between 1 and {MAX_REQUESTS_PER_SECOND}"
        ));
    }
    Ok(value)
}

/// RTT calibration dataset harvester
#[derive(Parser, Debug)]
#[command(name = "rtt-harvester")]
#[command(about = "Harvest RTT calibration samples from the RIPE Atlas archive", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding one sample log per destination anchor
    #[arg(long, global = true, default_value = "data/ping_times")]
    pub output_dir: PathBuf,

    /// Anchor list cache file
    #[arg(long, global = true, default_value = "data/anchors.csv")]
    pub anchor_cache: PathBuf,

    /// Measurement API base URL
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// API key sent with every request
    #[arg(long, global = true, env = "ATLAS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Overall per-request timeout in seconds (default: none)
    #[arg(long, global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Connect timeout in seconds (default: none)
    #[arg(long, global = true)]
    pub connect_timeout_secs: Option<u64>,

    /// Requests per second across all workers
    #[arg(long, global = true, default_value_t = DEFAULT_REQUESTS_PER_WINDOW, value_parser = parse_request_rate)]
    pub requests_per_second: usize,

    /// Seconds to wait before resubmitting a failed batch
    #[arg(long, global = true, default_value_t = DEFAULT_RETRY_INTERVAL.as_secs())]
    pub retry_interval_secs: u64,

    /// Double the retry wait after every failed attempt
    #[arg(long, global = true, default_value_t = false)]
    pub exponential_backoff: bool,

    /// Cap for exponential backoff in seconds
    #[arg(long, global = true, default_value_t = MAX_BACKOFF.as_secs())]
    pub max_backoff_secs: u64,

    /// Give up after this many retries (default: retry forever)
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest samples for every anchor
    Harvest(HarvestArgs),

    /// Refresh the anchor list cache
    Anchors(super::AnchorsCommand),

    /// Report per-destination progress from the sample logs
    Status(super::StatusCommand),
}

/// Harvest command arguments
#[derive(Parser, Debug)]
pub struct HarvestArgs {
    /// Concurrent destination workers (default: available parallelism, max: 64)
    #[arg(long, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Hours of measurement history to request (max: 87600)
    #[arg(
        long,
        default_value_t = 24,
        value_parser = clap::value_parser!(u64).range(1..=MAX_RESULTS_WINDOW_HOURS)
    )]
    pub results_window_hours: u64,

    /// Samples to keep per (destination, source) pair
    #[arg(long, default_value_t = TARGET_SAMPLE_COUNT)]
    pub target_samples: usize,
}

impl Cli {
    /// Upstream API settings from the global options
    pub fn atlas_config(&self) -> AtlasConfig {
        AtlasConfig {
            api_key: self.api_key.clone().filter(|key| !key.is_empty()),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            ..AtlasConfig::with_base_url(&self.base_url)
        }
    }

    /// Retry policy from the global options
    pub fn retry_policy(&self) -> RetryPolicy {
        let interval = Duration::from_secs(self.retry_interval_secs);
        let policy = if self.exponential_backoff {
            RetryPolicy::exponential(interval, Duration::from_secs(self.max_backoff_secs))
        } else {
            RetryPolicy::fixed(interval)
        };
        policy.with_max_retries(self.max_retries)
    }

    /// Configuration from the global options, harvest settings at defaults
    pub fn base_config(&self) -> HarvestConfig {
        HarvestConfig {
            output_dir: self.output_dir.clone(),
            anchor_cache: self.anchor_cache.clone(),
            retry: self.retry_policy(),
            atlas: self.atlas_config(),
            requests_per_window: self.requests_per_second,
            rate_window: DEFAULT_RATE_WINDOW,
            ..HarvestConfig::default()
        }
    }

    /// Full harvest configuration for the harvest command
    pub fn harvest_config(&self, args: &HarvestArgs) -> Result<HarvestConfig, CliError> {
        let base = self.base_config();
        let config = HarvestConfig {
            workers: args.workers.unwrap_or(base.workers),
            target_samples: args.target_samples,
            results_window: Duration::from_secs(args.results_window_hours * 3600),
            ..base
        };
        config
            .validate()
            .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
        Ok(config)
    }

    /// Install the metrics exporter if an address was given
    pub fn init_metrics(&self) {
        if let Some(addr) = self.metrics_addr {
            if let Err(e) = crate::metrics::init_metrics(addr) {
                warn!(error = %e, "Metrics exporter not started");
            }
        }
    }
}

impl HarvestArgs {
    /// Execute the harvest command
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<HarvestSummary, CliError> {
        let config = cli.harvest_config(self)?;
        cli.init_metrics();

        info!(
            output_dir = %config.output_dir.display(),
            anchor_cache = %config.anchor_cache.display(),
            workers = config.workers,
            target = config.target_samples,
            results_window_hours = self.results_window_hours,
            "Starting harvest"
        );

        let summary = Harvester::new(config)
            .with_shutdown(shutdown)
            .run()
            .await?;

        println!(
            "Harvested {} samples for {} destinations ({} fully satisfied, {} pairs outstanding) in {} attempt(s)",
            summary.samples_written,
            summary.destinations,
            summary.satisfied_destinations,
            summary.outstanding_pairs,
            summary.attempts
        );
        Ok(summary)
    }
}
