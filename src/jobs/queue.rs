//! Job queue service: the producer/worker API surface and the job state
//! machine.
//!
//! Jobs are mutated exclusively through this service (and the store
//! transitions it drives); processors and producers never touch job state
//! directly. Whole-job retry bookkeeping lives here: the in-attempt retry
//! loop in `retry.rs` is a separate concept.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::jobs::error::JobError;
use crate::jobs::model::{
    AttemptRecord, EnqueueOptions, Job, JobStatus, JobType, NewJob, QueueStats, TerminalReason,
};
use crate::jobs::retry::{backoff_delay, RetryOptions};
use crate::jobs::store::JobStore;

/// "now - N days", for retention sweeps.
pub fn cutoff_days(days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(days)
}

#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    /// Spacing for whole-job retries: `scheduled_for` on reschedule is
    /// pushed out by this policy's delay for the current retry count.
    backoff: RetryOptions,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            backoff: RetryOptions::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: RetryOptions) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Persist a new PENDING job and return its id.
    ///
    /// An administratively disabled job type is a no-op returning `None`;
    /// callers must not treat that as a failure.
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: Value,
        options: EnqueueOptions,
    ) -> anyhow::Result<Option<Uuid>> {
        if self.config.is_disabled(job_type) {
            tracing::warn!(%job_type, "enqueue skipped: job type is disabled");
            return Ok(None);
        }

        let job = self
            .store
            .create(NewJob {
                job_type,
                payload,
                priority: options.priority.unwrap_or(self.config.default_priority),
                max_retries: options.max_retries.unwrap_or(self.config.max_retries),
                scheduled_for: options.scheduled_for.unwrap_or_else(Utc::now),
            })
            .await?;

        tracing::debug!(
            job_id = %job.id,
            %job_type,
            priority = job.priority,
            max_retries = job.max_retries,
            "enqueued job"
        );
        Ok(Some(job.id))
    }

    /// Claim the single best eligible job, flipping it to PROCESSING.
    pub async fn claim_next(&self) -> anyhow::Result<Option<Job>> {
        let job = self.store.claim_next(Utc::now()).await?;
        if let Some(job) = &job {
            tracing::debug!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempt = job.retry_count + 1,
                "claimed job"
            );
        }
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        self.store.get(id).await
    }

    pub async fn get_jobs_by_status(
        &self,
        status: JobStatus,
        limit: i64,
    ) -> anyhow::Result<Vec<Job>> {
        self.store.list_by_status(status, limit).await
    }

    pub async fn get_pending_jobs(&self, limit: i64) -> anyhow::Result<Vec<Job>> {
        self.store.list_by_status(JobStatus::Pending, limit).await
    }

    /// PROCESSING -> COMPLETED with the processor's result map.
    pub async fn on_success(
        &self,
        id: Uuid,
        result: Value,
        duration: Duration,
    ) -> anyhow::Result<Option<Job>> {
        let attempt = AttemptRecord {
            timestamp: Utc::now(),
            success: true,
            error: None,
            duration_ms: duration.as_millis() as i64,
        };

        let job = self.store.complete(id, result, attempt).await?;
        match &job {
            Some(job) => {
                tracing::info!(job_id = %job.id, job_type = %job.job_type, "job completed")
            }
            None => tracing::warn!(job_id = %id, "success for a job no longer processing; ignored"),
        }
        Ok(job)
    }

    /// PROCESSING -> PENDING (another attempt later) or FAILED, depending on
    /// the error classification and the remaining retry budget. Every
    /// failure appends to the attempts audit log.
    pub async fn on_failure(
        &self,
        id: Uuid,
        error: &JobError,
        duration: Duration,
    ) -> anyhow::Result<Option<Job>> {
        let Some(job) = self.store.get(id).await? else {
            tracing::warn!(job_id = %id, "failure reported for unknown job");
            return Ok(None);
        };

        let attempt = AttemptRecord {
            timestamp: Utc::now(),
            success: false,
            error: Some(error.to_string()),
            duration_ms: duration.as_millis() as i64,
        };

        let can_retry = error.is_retryable() && job.retry_count + 1 <= job.max_retries;
        let updated = if can_retry {
            let mut rng = StdRng::from_entropy();
            let delay = backoff_delay(job.retry_count as u32, &self.backoff, &mut rng);
            let scheduled_for = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

            let updated = self
                .store
                .reschedule(id, &error.to_string(), attempt, scheduled_for)
                .await?;
            if let Some(job) = &updated {
                tracing::warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    retry_count = job.retry_count,
                    max_retries = job.max_retries,
                    error = %error,
                    "job failed; rescheduled"
                );
            }
            updated
        } else {
            let reason = if error.is_retryable() {
                TerminalReason::RetriesExhausted
            } else {
                TerminalReason::NonRetryable
            };

            let updated = self
                .store
                .fail(id, &error.to_string(), attempt, reason)
                .await?;
            if let Some(job) = &updated {
                tracing::error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    reason = reason.as_str(),
                    error = %error,
                    "job failed terminally"
                );
            }
            updated
        };

        if updated.is_none() {
            tracing::warn!(job_id = %id, "failure for a job no longer processing; ignored");
        }
        Ok(updated)
    }

    /// Manually return a FAILED job to the claimable pool. Refuses (returns
    /// `false`) once the retry budget is exhausted; history is kept.
    pub async fn retry_job(&self, id: Uuid) -> anyhow::Result<bool> {
        let retried = self.store.retry_failed(id, Utc::now()).await?;
        if retried {
            tracing::info!(job_id = %id, "job manually requeued");
        }
        Ok(retried)
    }

    /// Operator action: park a non-terminal job permanently.
    pub async fn abandon_job(&self, id: Uuid) -> anyhow::Result<bool> {
        let abandoned = self.store.abandon(id).await?;
        if abandoned {
            tracing::info!(job_id = %id, "job abandoned");
        }
        Ok(abandoned)
    }

    pub async fn get_queue_stats(&self) -> anyhow::Result<QueueStats> {
        self.store.counts_by_status().await
    }

    /// Retention sweep over COMPLETED jobs. Returns the number deleted.
    pub async fn cleanup_completed_jobs(&self, older_than_days: i64) -> anyhow::Result<u64> {
        let deleted = self
            .store
            .cleanup_completed(cutoff_days(older_than_days))
            .await?;
        if deleted > 0 {
            tracing::info!(deleted, older_than_days, "cleaned up completed jobs");
        }
        Ok(deleted)
    }
}
