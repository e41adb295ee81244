//! Worker pool and whole-batch retry supervision
//!
//! A batch is every destination job of the run. Workers pull jobs from a
//! shared cursor until it is exhausted. If any job fails with a transient
//! error, every worker is aborted and the entire batch is submitted again
//! after a backoff; jobs that already finished replay their logs and return
//! without network calls.

use super::config::{HarvestConfig, RetryPolicy};
use super::job::{DestinationJob, JobOutcome};
use super::orchestrator::{RetrievalOrchestrator, WorkerContext};
use super::progress::BatchProgress;
use super::{HarvestError, HarvestResult, HarvestSummary};
use crate::fetcher::MeasurementSource;
use crate::metrics;
use crate::shutdown::{self, SharedShutdown};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Builds the measurement source of one worker
///
/// Called inside the worker task, on its first job.
pub type SourceFactory =
    Arc<dyn Fn() -> HarvestResult<Arc<dyn MeasurementSource>> + Send + Sync>;

/// Fixed-size pool running one orchestrator task per destination
pub struct WorkerPool {
    workers: usize,
    retry: RetryPolicy,
    orchestrator: Arc<RetrievalOrchestrator>,
    shutdown: Option<SharedShutdown>,
}

impl WorkerPool {
    /// Create a pool of `workers` tasks
    pub fn new(workers: usize, retry: RetryPolicy, orchestrator: RetrievalOrchestrator) -> Self {
        Self {
            workers: workers.max(1),
            retry,
            orchestrator: Arc::new(orchestrator),
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Create a pool from the harvest configuration
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.workers,
            config.retry,
            RetrievalOrchestrator::from_config(config),
        )
    }

    /// Attach a shared shutdown handle to the pool and its orchestrator
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        let orchestrator = (*self.orchestrator).clone().with_shutdown(shutdown.clone());
        self.orchestrator = Arc::new(orchestrator);
        self.shutdown = Some(shutdown);
        self
    }

    /// Run every job to `Done`, resubmitting the batch on transient failures
    ///
    /// # Errors
    /// - Fatal errors from any job abort the run immediately
    /// - `RetriesExhausted` once the retry policy gives up
    /// - `Shutdown` if shutdown is requested
    pub async fn run(
        &self,
        jobs: Vec<DestinationJob>,
        factory: SourceFactory,
    ) -> HarvestResult<HarvestSummary> {
        let started = Instant::now();
        let jobs: Arc<[DestinationJob]> = Arc::from(jobs);
        info!(
            destinations = jobs.len(),
            workers = self.workers.min(jobs.len().max(1)),
            "Starting harvest batch"
        );

        let (outcomes, attempts) = retry_transient(
            &self.retry,
            self.shutdown.as_ref(),
            "harvest batch",
            || self.run_batch(jobs.clone(), factory.clone()),
        )
        .await?;

        let summary = HarvestSummary::from_outcomes(&outcomes, attempts, started.elapsed());
        info!(
            destinations = summary.destinations,
            satisfied = summary.satisfied_destinations,
            samples = summary.samples_written,
            fetches = summary.measurements_fetched,
            attempts = summary.attempts,
            elapsed_secs = summary.elapsed.as_secs(),
            "Harvest batch complete"
        );
        Ok(summary)
    }

    /// Run the batch once; the first failure aborts every worker
    async fn run_batch(
        &self,
        jobs: Arc<[DestinationJob]>,
        factory: SourceFactory,
    ) -> HarvestResult<Vec<JobOutcome>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let cursor = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(BatchProgress::new(jobs.len()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut set = JoinSet::new();

        for worker_id in 0..self.workers.min(jobs.len()) {
            set.spawn(worker(
                worker_id,
                jobs.clone(),
                cursor.clone(),
                factory.clone(),
                self.orchestrator.clone(),
                progress.clone(),
                self.shutdown.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut failure = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failure = Some(e);
                    break;
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    failure = Some(HarvestError::Join(e.to_string()));
                    break;
                }
            }
        }

        if let Some(e) = failure {
            set.abort_all();
            // Wait for aborted workers so their log locks are released
            while set.join_next().await.is_some() {}
            return Err(e);
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        while let Ok(outcome) = rx.try_recv() {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker(
    worker_id: usize,
    jobs: Arc<[DestinationJob]>,
    cursor: Arc<AtomicUsize>,
    factory: SourceFactory,
    orchestrator: Arc<RetrievalOrchestrator>,
    progress: Arc<BatchProgress>,
    shutdown: Option<SharedShutdown>,
    tx: mpsc::UnboundedSender<JobOutcome>,
) -> HarvestResult<()> {
    let mut context: Option<WorkerContext> = None;

    loop {
        if shutdown.as_ref().is_some_and(|s| s.is_shutdown_requested()) {
            return Err(HarvestError::Shutdown);
        }

        let index = cursor.fetch_add(1, Ordering::SeqCst);
        let Some(job) = jobs.get(index) else {
            break;
        };

        let mut ctx = match context.take() {
            Some(ctx) => ctx,
            None => {
                debug!(worker_id, "Creating worker context");
                WorkerContext::from_entropy(factory()?)
            }
        };

        let outcome = orchestrator.run(&mut ctx, job).await?;
        context = Some(ctx);

        progress.record(&outcome);
        let _ = tx.send(outcome);
    }

    debug!(worker_id, "Worker finished");
    Ok(())
}

/// Run `operation` until it succeeds, retrying transient failures
///
/// # Returns
/// The value and the number of attempts it took
///
/// # Errors
/// Fatal errors immediately; `RetriesExhausted` when the policy gives up;
/// `Shutdown` when shutdown interrupts the backoff
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    shutdown: Option<&SharedShutdown>,
    label: &str,
    mut operation: F,
) -> HarvestResult<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarvestResult<T>>,
{
    let mut retry = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok((value, retry + 1)),
            Err(e) if e.is_transient() => {
                retry += 1;
                if !policy.allows(retry) {
                    error!(
                        operation = label,
                        retries = retry - 1,
                        error = %e,
                        "Max retries exceeded"
                    );
                    return Err(HarvestError::RetriesExhausted {
                        attempts: retry,
                        last_error: e.to_string(),
                    });
                }

                let backoff = policy.backoff(retry);
                warn!(
                    operation = label,
                    retry,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient failure, resubmitting after backoff"
                );
                metrics::record_batch_retry(retry, backoff);

                if !sleep_unless_shutdown(backoff, shutdown).await {
                    return Err(HarvestError::Shutdown);
                }
            }
            Err(HarvestError::Shutdown) => {
                info!(operation = label, "Shutdown requested, stopping");
                return Err(HarvestError::Shutdown);
            }
            Err(e) => {
                error!(operation = label, error = %e, "Fatal error, aborting");
                return Err(e);
            }
        }
    }
}

/// Sleep for `backoff`; `false` if shutdown was requested first
async fn sleep_unless_shutdown(backoff: Duration, shutdown: Option<&SharedShutdown>) -> bool {
    match shutdown {
        Some(shutdown) => shutdown.sleep(backoff).await,
        None => {
            tokio::time::sleep(backoff).await;
            true
        }
    }
}
