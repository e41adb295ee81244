//! Per-destination retrieval
//!
//! One [`RetrievalOrchestrator::run`] call walks a single destination through
//! `LoadingProgress -> Draining(i) -> Done`. Everything it needs to know about
//! earlier runs comes from the destination's sample log, so a job can be
//! re-run any number of times.

use super::config::HarvestConfig;
use super::job::{DestinationJob, JobOutcome, JobState};
use super::{HarvestError, HarvestResult};
use crate::downsample::downsample;
use crate::fetcher::{MeasurementSource, ProbeResult};
use crate::resume::CheckpointLedger;
use crate::shutdown::{self, SharedShutdown};
use crate::{metrics, PingTimeRecord};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Resources owned by one worker
///
/// Built inside the worker task on its first job and never shared.
pub struct WorkerContext {
    /// Upstream source, one HTTP client per worker
    pub source: Arc<dyn MeasurementSource>,
    /// Random source for downsampling
    pub rng: StdRng,
}

impl WorkerContext {
    /// Context with an explicit RNG
    pub fn new(source: Arc<dyn MeasurementSource>, rng: StdRng) -> Self {
        Self { source, rng }
    }

    /// Context with an entropy-seeded RNG
    pub fn from_entropy(source: Arc<dyn MeasurementSource>) -> Self {
        Self::new(source, StdRng::from_entropy())
    }
}

/// Drives one destination from its log to `Done`
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    output_dir: PathBuf,
    target: usize,
    results_window: Duration,
    shutdown: Option<SharedShutdown>,
}

impl RetrievalOrchestrator {
    /// Create an orchestrator writing logs under `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>, target: usize, results_window: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            target,
            results_window,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Create an orchestrator from the harvest configuration
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.output_dir.clone(),
            config.target_samples,
            config.results_window,
        )
    }

    /// Attach a shared shutdown handle
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Retrieve samples for one destination until every source has enough
    ///
    /// # Errors
    /// Fetch failures and ledger errors propagate unchanged; nothing is
    /// retried here.
    pub async fn run(
        &self,
        ctx: &mut WorkerContext,
        job: &DestinationJob,
    ) -> HarvestResult<JobOutcome> {
        let destination = &job.anchor;
        let mut outcome = JobOutcome::new(destination);
        let expected = job.expected_sources();

        let mut state = JobState::LoadingProgress;
        debug!(anchor = destination.aid, %state, "Destination state");

        let (mut progress, mut ledger) = CheckpointLedger::open(&self.output_dir, destination)?;
        let mut todo = progress.todo(&expected, self.target);

        if !todo.is_empty() {
            let start = Utc::now().timestamp() - self.results_window.as_secs() as i64;

            for (i, &measurement) in job.measurements.iter().enumerate() {
                if self.shutdown_requested() {
                    return Err(HarvestError::Shutdown);
                }

                state = JobState::Draining(i);
                debug!(
                    anchor = destination.aid,
                    %state,
                    measurement = %measurement,
                    outstanding = todo.len(),
                    "Destination state"
                );

                let results = ctx.source.fetch_results(measurement, start, &todo).await?;
                outcome.measurements_fetched += 1;

                for (source, rtts) in group_by_source(results, &todo) {
                    let kept = downsample(rtts, self.target, &mut ctx.rng);
                    if kept.is_empty() {
                        continue;
                    }
                    ledger.append(&PingTimeRecord::batch(destination.pid, source, &kept))?;
                    progress.record(source, kept.len());
                    outcome.samples_written += kept.len();
                    metrics::record_samples_retained(kept.len());
                }

                todo.retain(|&source| progress.count(source) < self.target);
                if todo.is_empty() {
                    break;
                }
            }
        }

        state = JobState::Done;
        outcome.sources_outstanding = todo.len();
        outcome.sources_satisfied = expected.len().saturating_sub(todo.len());
        metrics::record_destination_completed(outcome.is_satisfied());

        info!(
            anchor = destination.aid,
            address = %destination.address_v4,
            %state,
            samples = outcome.samples_written,
            measurements = outcome.measurements_fetched,
            satisfied = outcome.sources_satisfied,
            outstanding = outcome.sources_outstanding,
            "Destination finished"
        );

        Ok(outcome)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }
}

/// Collect RTTs per source in arrival order, keeping only sources in `todo`
fn group_by_source(results: Vec<ProbeResult>, todo: &[u32]) -> Vec<(u32, Vec<f64>)> {
    let wanted: HashSet<u32> = todo.iter().copied().collect();
    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut groups: Vec<(u32, Vec<f64>)> = Vec::new();

    for result in results {
        if !wanted.contains(&result.prb_id) {
            continue;
        }
        let slot = *slots.entry(result.prb_id).or_insert_with(|| {
            groups.push((result.prb_id, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.extend(result.rtts());
    }

    groups
}
