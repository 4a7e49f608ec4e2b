//! Whole-job retry bookkeeping across claim/failure cycles.

mod common;

use std::time::Duration;

use serde_json::json;

use courseflow::jobs::{
    EnqueueOptions, ErrorKind, JobError, JobStatus, JobType, TerminalReason,
};

use common::{memory_queue, test_config};

#[tokio::test]
async fn retry_exhaustion_walks_the_state_machine() {
    let queue = memory_queue(test_config());
    let id = queue
        .enqueue(
            JobType::ExternalSync,
            json!({"entity": "course"}),
            EnqueueOptions {
                max_retries: Some(2),
                ..EnqueueOptions::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    let transient = JobError::new(ErrorKind::Upstream, "lms returned 502");

    // Attempts 1 and 2 reschedule; attempt 3 exhausts the budget.
    for expected_retry_count in 1..=2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let claimed = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);

        let job = queue
            .on_failure(id, &transient, Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, expected_retry_count);
        assert!(job.retry_count <= job.max_retries);
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.claim_next().await.unwrap().unwrap();
    let job = queue
        .on_failure(id, &transient, Duration::from_millis(1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.terminal_reason, Some(TerminalReason::RetriesExhausted));
    assert_eq!(job.attempts.len(), 3);
    assert!(job.attempts.iter().all(|a| !a.success));
}

#[tokio::test]
async fn success_on_second_attempt_records_both() {
    let queue = memory_queue(test_config());
    let id = queue
        .enqueue(JobType::EmailSend, json!({"email": "a@b.com"}), EnqueueOptions::default())
        .await
        .unwrap()
        .unwrap();

    queue.claim_next().await.unwrap().unwrap();
    queue
        .on_failure(
            id,
            &JobError::new(ErrorKind::RateLimited, "rate limit exceeded"),
            Duration::from_millis(1),
        )
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.claim_next().await.unwrap().unwrap();
    let job = queue
        .on_success(id, json!({"emailSent": true}), Duration::from_millis(1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.attempts.len(), 2);
    assert!(!job.attempts[0].success);
    assert!(job.attempts[1].success);
    assert_eq!(job.result, Some(json!({"emailSent": true})));
}

#[tokio::test]
async fn fatal_failure_short_circuits_remaining_budget() {
    let queue = memory_queue(test_config());
    let id = queue
        .enqueue(
            JobType::PaymentVerify,
            json!({"order_id": "o1"}),
            EnqueueOptions {
                max_retries: Some(5),
                ..EnqueueOptions::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    queue.claim_next().await.unwrap().unwrap();
    let job = queue
        .on_failure(
            id,
            &JobError::new(ErrorKind::NotFound, "order does not exist"),
            Duration::from_millis(1),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.terminal_reason, Some(TerminalReason::NonRetryable));
    assert_eq!(job.attempts.len(), 1);
}

#[tokio::test]
async fn failure_reports_for_unclaimed_jobs_are_ignored() {
    let queue = memory_queue(test_config());
    let id = queue
        .enqueue(JobType::EmailSend, json!({"email": "a@b.com"}), EnqueueOptions::default())
        .await
        .unwrap()
        .unwrap();

    // Never claimed, so not PROCESSING: the conditional update is a no-op.
    let updated = queue
        .on_failure(
            id,
            &JobError::new(ErrorKind::Upstream, "stray report"),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
    assert!(updated.is_none());

    let job = queue.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.attempts.is_empty());
}

#[tokio::test]
async fn attempt_log_carries_error_messages_and_durations() {
    let queue = memory_queue(test_config());
    let id = queue
        .enqueue(JobType::EmailSend, json!({"email": "a@b.com"}), EnqueueOptions::default())
        .await
        .unwrap()
        .unwrap();

    queue.claim_next().await.unwrap().unwrap();
    queue
        .on_failure(
            id,
            &JobError::new(ErrorKind::Timeout, "smtp timed out"),
            Duration::from_millis(42),
        )
        .await
        .unwrap()
        .unwrap();

    let job = queue.get_job(id).await.unwrap().unwrap();
    let attempt = &job.attempts[0];
    assert_eq!(attempt.duration_ms, 42);
    assert_eq!(attempt.error.as_deref(), Some("TIMEOUT: smtp timed out"));
    assert_eq!(job.error.as_deref(), Some("TIMEOUT: smtp timed out"));
}
