//! Timeout + exponential-backoff-with-jitter retry loop for a single
//! asynchronous operation.
//!
//! This is in-attempt retry for transient sub-operations (one HTTP call, one
//! send). It never persists anything; whole-job rescheduling across poll
//! cycles is the queue service's business and uses the job's own
//! `retry_count`.

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::jobs::error::{ErrorKind, JobError};

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the random jitter added to every delay.
    pub jitter: Duration,
    pub per_attempt_timeout: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(100),
            per_attempt_timeout: Duration::from_secs(60),
        }
    }
}

/// Delay before re-running attempt `attempt_no` (0-indexed):
/// `min(max_delay, base_delay * multiplier^attempt_no) + random(0, jitter)`.
pub fn backoff_delay(attempt_no: u32, opts: &RetryOptions, rng: &mut impl Rng) -> Duration {
    let base_ms = opts.base_delay.as_millis() as f64;
    let max_ms = opts.max_delay.as_millis() as f64;

    // powi can overflow to inf for large attempt counts; the cap absorbs it.
    let mut delay_ms = base_ms * opts.backoff_multiplier.powi(attempt_no as i32);
    if !delay_ms.is_finite() || delay_ms > max_ms {
        delay_ms = max_ms;
    }

    let jitter_ms = opts.jitter.as_millis() as u64;
    let jitter = if jitter_ms > 0 {
        rng.gen_range(0..=jitter_ms)
    } else {
        0
    };

    Duration::from_millis(delay_ms.round() as u64 + jitter)
}

/// Run `operation` until it succeeds, fails fatally, or exhausts the retry
/// budget. Every attempt races a per-attempt timeout; a timeout counts as a
/// retryable failure. A fatal classification stops the loop immediately
/// regardless of remaining budget; on exhaustion the last error is returned.
pub async fn run_with_retry<T, F, Fut>(mut operation: F, opts: &RetryOptions) -> Result<T, JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JobError>>,
{
    let mut attempt_no: u32 = 0;

    loop {
        let outcome = match tokio::time::timeout(opts.per_attempt_timeout, operation()).await {
            Ok(res) => res,
            Err(_) => Err(JobError::new(
                ErrorKind::Timeout,
                format!(
                    "attempt timed out after {}ms",
                    opts.per_attempt_timeout.as_millis()
                ),
            )),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt_no >= opts.max_retries {
            return Err(err);
        }

        let mut rng = StdRng::from_entropy();
        let delay = backoff_delay(attempt_no, opts, &mut rng);
        tracing::debug!(
            attempt_no,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient failure"
        );
        tokio::time::sleep(delay).await;
        attempt_no += 1;
    }
}
