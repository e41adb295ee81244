//! Unit tests for retry policy and the transient-retry supervisor

use rtt_harvester::fetcher::FetcherError;
use rtt_harvester::harvester::{retry_transient, HarvestError, RetryPolicy};
use rtt_harvester::resume::ResumeError;
use rtt_harvester::shutdown::ShutdownCoordinator;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[test]
fn test_fixed_policy_waits_the_same_every_time() {
    let policy = RetryPolicy::fixed(Duration::from_secs(30));
    assert_eq!(policy.backoff(1), Duration::from_secs(30));
    assert_eq!(policy.backoff(50), Duration::from_secs(30));
    assert!(policy.allows(u32::MAX));
}

#[test]
fn test_exponential_policy_is_capped() {
    let policy = RetryPolicy::exponential(Duration::from_secs(30), Duration::from_secs(900))
        .with_max_retries(Some(10));

    assert_eq!(policy.backoff(1), Duration::from_secs(30));
    assert_eq!(policy.backoff(2), Duration::from_secs(60));
    assert_eq!(policy.backoff(5), Duration::from_secs(480));
    assert_eq!(policy.backoff(6), Duration::from_secs(900));
    assert_eq!(policy.backoff(40), Duration::from_secs(900));
    assert!(policy.allows(10));
    assert!(!policy.allows(11));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_until_success() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let policy = RetryPolicy::fixed(Duration::from_secs(30));

    let (value, attempts) = retry_transient(&policy, None, "catalog", || async move {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            Err(HarvestError::Fetcher(FetcherError::Network("reset".into())))
        } else {
            Ok(17)
        }
    })
    .await
    .unwrap();

    assert_eq!(value, 17);
    assert_eq!(attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_is_not_retried() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let policy = RetryPolicy::fixed(Duration::from_secs(30));

    let result: Result<((), u32), _> = retry_transient(&policy, None, "ledger", || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(HarvestError::Resume(ResumeError::Corrupt {
            path: "192.0.2.1.csv".into(),
            reason: "foreign destination".into(),
        }))
    })
    .await;

    assert!(matches!(result, Err(HarvestError::Resume(ResumeError::Corrupt { .. }))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_limit_reports_last_error() {
    let policy = RetryPolicy::fixed(Duration::from_secs(1)).with_max_retries(Some(2));

    let result: Result<((), u32), _> = retry_transient(&policy, None, "batch", || async {
        Err(HarvestError::Io("disk full".into()))
    })
    .await;

    match result {
        Err(HarvestError::RetriesExhausted { attempts, last_error }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("disk full"));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_during_backoff_stops_retrying() {
    let shutdown = ShutdownCoordinator::shared();
    let policy = RetryPolicy::fixed(Duration::from_secs(3600));
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.request_shutdown();
    });

    let result: Result<((), u32), _> = retry_transient(&policy, Some(&shutdown), "batch", || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(HarvestError::Fetcher(FetcherError::HttpStatus {
            status: 502,
            url: "http://localhost/".into(),
            body: String::new(),
        }))
    })
    .await;

    assert!(matches!(result, Err(HarvestError::Shutdown)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
