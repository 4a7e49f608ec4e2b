#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use courseflow::config::QueueConfig;
use courseflow::jobs::{
    ErrorKind, JobError, JobQueue, JobType, MemoryJobStore, ProcessorRegistry, RetryOptions,
};

/// Tight timings so whole-job retries and worker polls resolve in
/// milliseconds instead of the production defaults.
pub fn test_config() -> QueueConfig {
    QueueConfig {
        poll_interval_ms: 20,
        wait_poll_interval_ms: 5,
        per_attempt_timeout_ms: 1_000,
        ..QueueConfig::default()
    }
}

pub fn fast_backoff() -> RetryOptions {
    RetryOptions {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: Duration::ZERO,
        per_attempt_timeout: Duration::from_secs(1),
    }
}

pub fn memory_queue(config: QueueConfig) -> Arc<JobQueue> {
    Arc::new(JobQueue::new(Arc::new(MemoryJobStore::new()), config).with_backoff(fast_backoff()))
}

/// Register a processor that fails `fail_times` times with `kind`, then
/// succeeds. Returns the invocation counter.
pub fn register_flaky(
    registry: &mut ProcessorRegistry,
    job_type: JobType,
    fail_times: u32,
    kind: ErrorKind,
) -> Arc<AtomicU32> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    registry.register(job_type, move |_req| {
        let calls = calls.clone();
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < fail_times {
                Err(JobError::new(kind, format!("simulated failure {n}")))
            } else {
                Ok(json!({"ok": true}))
            }
        })
    });

    counter
}

/// Register a processor that always fails with `kind` and `message`.
pub fn register_failing(
    registry: &mut ProcessorRegistry,
    job_type: JobType,
    kind: ErrorKind,
    message: &'static str,
) -> Arc<AtomicU32> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    registry.register(job_type, move |_req| {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(JobError::new(kind, message))
        })
    });

    counter
}

/// Register a processor that sleeps before succeeding, for concurrency
/// observations.
pub fn register_slow(registry: &mut ProcessorRegistry, job_type: JobType, sleep: Duration) {
    registry.register(job_type, move |_req| {
        Box::pin(async move {
            tokio::time::sleep(sleep).await;
            Ok(json!({"ok": true}))
        })
    });
}
