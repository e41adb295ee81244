//! Integration tests for resuming interrupted destinations

use crate::support::{anchor, probe_result, StubArchive};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rtt_harvester::harvester::{DestinationJob, RetrievalOrchestrator, WorkerContext};
use rtt_harvester::resume::{inspect, ledger_path, CheckpointLedger, ResumeError};
use rtt_harvester::{MeasurementRef, PingTimeRecord};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TARGET: usize = 50;
const WINDOW: Duration = Duration::from_secs(3600);

fn context(archive: Arc<StubArchive>) -> WorkerContext {
    WorkerContext::new(archive, StdRng::seed_from_u64(11))
}

/// Destination 1 with two measurements; the first only covers source 6002
fn split_archive() -> StubArchive {
    let mut archive = StubArchive::default();
    archive.results.insert(
        MeasurementRef(501),
        vec![probe_result(6002, (0..80).map(f64::from))],
    );
    archive.results.insert(
        MeasurementRef(502),
        vec![
            probe_result(6002, (0..80).map(f64::from)),
            probe_result(6003, (0..80).map(f64::from)),
        ],
    );
    archive
}

fn job() -> DestinationJob {
    DestinationJob::new(
        anchor(1, 6001),
        vec![MeasurementRef(501), MeasurementRef(502)],
        Arc::from(vec![6001, 6002, 6003]),
    )
}

#[tokio::test]
async fn test_rerun_after_completion_fetches_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = RetrievalOrchestrator::new(temp_dir.path(), TARGET, WINDOW);

    let archive = Arc::new(split_archive());
    let first = orchestrator
        .run(&mut context(archive.clone()), &job())
        .await
        .unwrap();
    assert!(first.is_satisfied());
    assert_eq!(
        archive.fetched_measurements(),
        vec![MeasurementRef(501), MeasurementRef(502)]
    );

    let rerun_archive = Arc::new(split_archive());
    let second = orchestrator
        .run(&mut context(rerun_archive.clone()), &job())
        .await
        .unwrap();

    assert!(second.is_satisfied());
    assert_eq!(second.samples_written, 0);
    assert_eq!(rerun_archive.fetch_count(), 0);
}

#[tokio::test]
async fn test_partial_progress_only_requests_missing_sources() {
    let temp_dir = TempDir::new().unwrap();
    let destination = anchor(1, 6001);

    // A previous run satisfied 6002 and crashed while writing a row
    {
        let (_, mut ledger) = CheckpointLedger::open(temp_dir.path(), &destination).unwrap();
        let rtts: Vec<f64> = (0..TARGET).map(|i| i as f64).collect();
        ledger
            .append(&PingTimeRecord::batch(6001, 6002, &rtts))
            .unwrap();
    }
    let path = ledger_path(temp_dir.path(), destination.address_v4);
    std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(b"6001,6003,0,1")
        .unwrap();

    let archive = Arc::new(split_archive());
    let orchestrator = RetrievalOrchestrator::new(temp_dir.path(), TARGET, WINDOW);
    let outcome = orchestrator
        .run(&mut context(archive.clone()), &job())
        .await
        .unwrap();

    let requested = archive.fetches.lock().unwrap().clone();
    assert!(requested.iter().all(|(_, probes)| probes == &vec![6003]));
    assert!(outcome.is_satisfied());

    let progress = inspect(&path, 6001).unwrap();
    assert_eq!(progress.count(6002), TARGET);
    assert_eq!(progress.count(6003), TARGET);
}

#[tokio::test]
async fn test_log_of_other_destination_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let destination = anchor(1, 6001);
    let path = ledger_path(temp_dir.path(), destination.address_v4);
    std::fs::write(
        &path,
        "destination_probe_id,source_probe_id,sample_index,rtt\n7777,6002,0,12.5\n",
    )
    .unwrap();

    let archive = Arc::new(split_archive());
    let orchestrator = RetrievalOrchestrator::new(temp_dir.path(), TARGET, WINDOW);
    let result = orchestrator.run(&mut context(archive.clone()), &job()).await;

    let err = result.unwrap_err();
    assert!(!err.is_transient());
    assert!(matches!(
        err,
        rtt_harvester::harvester::HarvestError::Resume(ResumeError::Corrupt { .. })
    ));
    assert_eq!(archive.fetch_count(), 0);
}

#[test]
fn test_inspect_reports_without_touching_the_log() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("198.51.100.1.csv");
    let content = "destination_probe_id,source_probe_id,sample_index,rtt\n6001,6002,0,1.5\n6001,6002,1,2.5\n6001,6003,0,3";
    std::fs::write(&path, content).unwrap();

    let progress = inspect(&path, 6001).unwrap();

    assert_eq!(progress.count(6002), 2);
    assert_eq!(progress.count(6003), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
}
