//! In-attempt retry loop: classification, timeout racing, and exhaustion.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courseflow::jobs::{run_with_retry, ErrorKind, JobError, RetryOptions};

fn fast_options(max_retries: u32) -> RetryOptions {
    RetryOptions {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: Duration::ZERO,
        per_attempt_timeout: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn succeeds_after_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result = run_with_retry(
        move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(JobError::new(ErrorKind::RateLimited, "slow down"))
                } else {
                    Ok(n)
                }
            }
        },
        &fast_options(5),
    )
    .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fatal_classification_stops_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<(), JobError> = run_with_retry(
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobError::new(ErrorKind::Validation, "malformed payload"))
            }
        },
        &fast_options(5),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhaustion_reraises_the_last_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<(), JobError> = run_with_retry(
        move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(JobError::new(ErrorKind::Upstream, format!("boom {n}")))
            }
        },
        &fast_options(2),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Upstream);
    // 1 initial try + 2 retries; the error from the final attempt surfaces.
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(err.message, "boom 2");
}

#[tokio::test]
async fn timeout_counts_as_a_retryable_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let mut opts = fast_options(1);
    opts.per_attempt_timeout = Duration::from_millis(10);

    let result: Result<(), JobError> = run_with_retry(
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        },
        &opts,
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    // Timed out, retried once, timed out again.
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_retries_means_exactly_one_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<(), JobError> = run_with_retry(
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobError::new(ErrorKind::ServiceUnavailable, "down"))
            }
        },
        &fast_options(0),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
