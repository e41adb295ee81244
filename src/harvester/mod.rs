//! Retrieval orchestration and worker pool
//!
//! # Overview
//!
//! A harvest run has two phases:
//!
//! 1. **Catalog**: load the anchor list (cached) and the anchor to
//!    measurement mapping, see [`crate::catalog`]
//! 2. **Batch**: one [`job::DestinationJob`] per anchor, executed by the
//!    [`pool::WorkerPool`]; each job is driven by the
//!    [`orchestrator::RetrievalOrchestrator`] from its sample log to `Done`
//!
//! Both phases are retried as a whole on transient failures. Retrying is safe
//! because every job derives its remaining work from the on-disk logs.
//!
//! # Error Handling
//!
//! All operations return `Result<T, HarvestError>`. [`HarvestError::is_transient`]
//! separates upstream and I/O failures (retried) from schema, corruption,
//! lock and configuration errors (fatal).

pub mod config;
pub mod job;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod rate_limit;


pub use config::{HarvestConfig, RetryPolicy};
pub use job::{DestinationJob, JobOutcome, JobState};
pub use orchestrator::{RetrievalOrchestrator, WorkerContext};
pub use pool::{retry_transient, SourceFactory, WorkerPool};
pub use rate_limit::{RateLimitError, RateLimiter};

use crate::catalog::{
    load_anchors, load_measurements, write_anchor_cache, AnchorCatalog, CatalogError,
    MeasurementMap,
};
use crate::fetcher::{AtlasFetcher, FetcherError, MeasurementSource};
use crate::resume::ResumeError;
use crate::shutdown::{self, SharedShutdown};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Harvest errors
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Upstream request failed
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Sample log error
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),

    /// Catalog loading error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Worker task panicked
    #[error("worker task failed: {0}")]
    Join(String),

    /// Shutdown requested
    #[error("shutdown requested")]
    Shutdown,

    /// Retry policy gave up
    #[error("giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first
        attempts: u32,
        /// Error of the last attempt
        last_error: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Whether resubmitting the failed work may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            HarvestError::Fetcher(e) => e.is_transient(),
            HarvestError::Resume(e) => e.is_transient(),
            HarvestError::Catalog(CatalogError::Fetcher(e)) => e.is_transient(),
            HarvestError::Catalog(CatalogError::Io(_)) => true,
            HarvestError::Io(_) => true,
            HarvestError::Catalog(_)
            | HarvestError::Join(_)
            | HarvestError::Shutdown
            | HarvestError::RetriesExhausted { .. }
            | HarvestError::Config(_) => false,
        }
    }
}

/// Result type for harvest operations
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Totals of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Destinations in the batch
    pub destinations: usize,
    /// Destinations with every source at target
    pub satisfied_destinations: usize,
    /// Samples appended by the successful attempt
    pub samples_written: usize,
    /// Result batches fetched by the successful attempt
    pub measurements_fetched: usize,
    /// (destination, source) pairs still below target
    pub outstanding_pairs: usize,
    /// Batch attempts, including the successful one
    pub attempts: u32,
    /// Wall time including retries
    pub elapsed: Duration,
}

impl HarvestSummary {
    /// Aggregate job outcomes
    pub fn from_outcomes(outcomes: &[JobOutcome], attempts: u32, elapsed: Duration) -> Self {
        Self {
            destinations: outcomes.len(),
            satisfied_destinations: outcomes.iter().filter(|o| o.is_satisfied()).count(),
            samples_written: outcomes.iter().map(|o| o.samples_written).sum(),
            measurements_fetched: outcomes.iter().map(|o| o.measurements_fetched).sum(),
            outstanding_pairs: outcomes.iter().map(|o| o.sources_outstanding).sum(),
            attempts,
            elapsed,
        }
    }
}

/// Build one job per catalog anchor
///
/// Anchors without known measurements still get a job so their log exists
/// and their outstanding sources are reported.
pub fn build_jobs(catalog: &AnchorCatalog, measurements: &MeasurementMap) -> Vec<DestinationJob> {
    let all_sources: Arc<[u32]> = Arc::from(catalog.probe_ids.clone());
    catalog
        .anchors
        .iter()
        .map(|anchor| {
            DestinationJob::new(
                anchor.clone(),
                measurements.get(&anchor.aid).cloned().unwrap_or_default(),
                all_sources.clone(),
            )
        })
        .collect()
}

/// End-to-end harvest against the Atlas API
pub struct Harvester {
    config: HarvestConfig,
    shutdown: Option<SharedShutdown>,
}

impl Harvester {
    /// Create a harvester
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Attach a shared shutdown handle
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Load the catalog, then run every destination to `Done`
    ///
    /// # Errors
    /// Configuration, schema and corruption errors abort; transient failures
    /// are retried per the configured [`RetryPolicy`].
    pub async fn run(&self) -> HarvestResult<HarvestSummary> {
        self.config.validate()?;
        let rate_limiter = Arc::new(self.rate_limiter());

        let catalog_source = AtlasFetcher::new(self.config.atlas.clone(), rate_limiter.clone())?;
        let (catalog, measurements) = self.load_catalog(&catalog_source).await?;
        let jobs = build_jobs(&catalog, &measurements);

        let atlas = self.config.atlas.clone();
        let factory: SourceFactory = Arc::new(move || {
            let source = AtlasFetcher::new(atlas.clone(), rate_limiter.clone())?;
            Ok(Arc::new(source) as Arc<dyn MeasurementSource>)
        });

        let mut pool = WorkerPool::from_config(&self.config);
        if let Some(shutdown) = &self.shutdown {
            pool = pool.with_shutdown(shutdown.clone());
        }
        pool.run(jobs, factory).await
    }

    /// Fetch the anchor list and overwrite the cache
    pub async fn refresh_anchors(&self) -> HarvestResult<AnchorCatalog> {
        self.config.validate()?;
        let source = AtlasFetcher::new(self.config.atlas.clone(), Arc::new(self.rate_limiter()))?;
        let source = &source;

        let (anchors, _) = retry_transient(
            &self.config.retry,
            self.shutdown.as_ref(),
            "anchor listing",
            || async move { Ok::<_, HarvestError>(source.list_anchors().await?) },
        )
        .await?;

        let catalog = AnchorCatalog::new(anchors);
        write_anchor_cache(&self.config.anchor_cache, &catalog.anchors)?;
        Ok(catalog)
    }

    /// Load anchors and measurements, retrying transient failures
    pub async fn load_catalog(
        &self,
        source: &dyn MeasurementSource,
    ) -> HarvestResult<(AnchorCatalog, MeasurementMap)> {
        let cache_path = self.config.anchor_cache.as_path();

        let (catalog, _) = retry_transient(
            &self.config.retry,
            self.shutdown.as_ref(),
            "anchor catalog",
            || async move { Ok::<_, HarvestError>(load_anchors(cache_path, source).await?) },
        )
        .await?;

        let ids = catalog.ids.as_slice();
        let (measurements, _) = retry_transient(
            &self.config.retry,
            self.shutdown.as_ref(),
            "measurement catalog",
            || async move { Ok::<_, HarvestError>(load_measurements(source, ids).await?) },
        )
        .await?;

        info!(
            anchors = catalog.len(),
            measurements = measurements.values().map(Vec::len).sum::<usize>(),
            "Catalog ready"
        );
        Ok((catalog, measurements))
    }

    fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::request_based(self.config.requests_per_window, self.config.rate_window)
    }
}
