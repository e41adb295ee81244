//! Integration tests for the worker pool and batch resubmission

use crate::support::{anchor, StubArchive};
use rtt_harvester::catalog::AnchorCatalog;
use rtt_harvester::fetcher::MeasurementSource;
use rtt_harvester::harvester::{
    build_jobs, HarvestError, RetrievalOrchestrator, RetryPolicy, SourceFactory, WorkerPool,
};
use rtt_harvester::resume::{inspect, ledger_path};
use rtt_harvester::shutdown::ShutdownCoordinator;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TARGET: usize = 40;

fn catalog(count: u32) -> AnchorCatalog {
    AnchorCatalog::new((1..=count).map(|aid| anchor(aid, 6000 + aid)).collect())
}

fn factory(archive: Arc<StubArchive>) -> SourceFactory {
    Arc::new(move || Ok(archive.clone() as Arc<dyn MeasurementSource>))
}

fn pool(dir: &TempDir, workers: usize, retry: RetryPolicy) -> WorkerPool {
    let orchestrator = RetrievalOrchestrator::new(dir.path(), TARGET, Duration::from_secs(3600));
    WorkerPool::new(workers, retry, orchestrator).with_shutdown(ShutdownCoordinator::shared())
}

fn measurement_map(archive: &StubArchive) -> HashMap<u32, Vec<rtt_harvester::MeasurementRef>> {
    let mut map: HashMap<u32, Vec<_>> = HashMap::new();
    for (aid, measurement) in &archive.measurements {
        map.entry(*aid).or_default().push(*measurement);
    }
    map
}

#[tokio::test]
async fn test_every_destination_reaches_target() {
    let temp_dir = TempDir::new().unwrap();
    let catalog = catalog(5);
    let archive = Arc::new(StubArchive::complete(catalog.anchors.clone(), 100));
    let jobs = build_jobs(&catalog, &measurement_map(&archive));

    let summary = pool(&temp_dir, 3, RetryPolicy::fixed(Duration::from_millis(5)))
        .run(jobs, factory(archive.clone()))
        .await
        .unwrap();

    assert_eq!(summary.destinations, 5);
    assert_eq!(summary.satisfied_destinations, 5);
    assert_eq!(summary.samples_written, 5 * 4 * TARGET);
    assert_eq!(summary.outstanding_pairs, 0);
    assert_eq!(summary.attempts, 1);

    for destination in &catalog.anchors {
        let progress =
            inspect(&ledger_path(temp_dir.path(), destination.address_v4), destination.pid)
                .unwrap();
        assert_eq!(progress.sources(), 4);
        assert_eq!(progress.total(), 4 * TARGET);
    }
}

#[tokio::test]
async fn test_transient_failure_resubmits_without_duplicating_samples() {
    let temp_dir = TempDir::new().unwrap();
    let catalog = catalog(3);
    let archive = StubArchive::complete(catalog.anchors.clone(), 100);
    archive.failing_fetches.store(1, Ordering::SeqCst);
    let archive = Arc::new(archive);
    let jobs = build_jobs(&catalog, &measurement_map(&archive));

    let summary = pool(&temp_dir, 1, RetryPolicy::fixed(Duration::from_millis(5)))
        .run(jobs, factory(archive.clone()))
        .await
        .unwrap();

    assert_eq!(summary.attempts, 2);
    assert_eq!(summary.satisfied_destinations, 3);

    for destination in &catalog.anchors {
        let progress =
            inspect(&ledger_path(temp_dir.path(), destination.address_v4), destination.pid)
                .unwrap();
        assert_eq!(progress.total(), 2 * TARGET, "anchor {}", destination.aid);
    }
}

#[tokio::test]
async fn test_exhausted_retries_stop_the_batch() {
    let temp_dir = TempDir::new().unwrap();
    let catalog = catalog(2);
    let archive = StubArchive::complete(catalog.anchors.clone(), 100);
    archive.failing_fetches.store(usize::MAX, Ordering::SeqCst);
    let archive = Arc::new(archive);
    let jobs = build_jobs(&catalog, &measurement_map(&archive));

    let retry = RetryPolicy::fixed(Duration::from_millis(1)).with_max_retries(Some(2));
    let result = pool(&temp_dir, 2, retry)
        .run(jobs, factory(archive))
        .await;

    assert!(matches!(
        result,
        Err(HarvestError::RetriesExhausted { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn test_requested_shutdown_stops_before_any_fetch() {
    let temp_dir = TempDir::new().unwrap();
    let catalog = catalog(2);
    let archive = Arc::new(StubArchive::complete(catalog.anchors.clone(), 10));
    let jobs = build_jobs(&catalog, &measurement_map(&archive));

    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let orchestrator = RetrievalOrchestrator::new(temp_dir.path(), TARGET, Duration::from_secs(3600));
    let result = WorkerPool::new(2, RetryPolicy::fixed(Duration::from_secs(60)), orchestrator)
        .with_shutdown(shutdown)
        .run(jobs, factory(archive.clone()))
        .await;

    assert!(matches!(result, Err(HarvestError::Shutdown)));
    assert_eq!(archive.fetch_count(), 0);
}
