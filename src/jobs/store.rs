//! Durable persistence contract for job records.
//!
//! The store owns the authoritative status of every job and exposes named
//! transition operations whose conditions are applied atomically (a
//! conditional update keyed by job id, or select-and-lock for the claim).
//! Business policy — retry budgets, backoff, defaults — lives in the queue
//! service, not here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::model::{AttemptRecord, Job, JobStatus, NewJob, QueueStats, TerminalReason};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new PENDING job and return it with assigned id/timestamps.
    async fn create(&self, new_job: NewJob) -> anyhow::Result<Job>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Job>>;

    async fn list_by_status(&self, status: JobStatus, limit: i64) -> anyhow::Result<Vec<Job>>;

    /// Atomically select the single best claimable job (priority DESC, then
    /// created_at ASC, filtered to claimable status and `scheduled_for <=
    /// now`) and flip it to PROCESSING, stamping `started_at`. Two
    /// concurrent claimers must never both receive the same job.
    async fn claim_next(&self, now: DateTime<Utc>) -> anyhow::Result<Option<Job>>;

    /// PROCESSING -> COMPLETED: store the result and append the attempt.
    /// Returns `None` if the job was not in PROCESSING.
    async fn complete(
        &self,
        id: Uuid,
        result: Value,
        attempt: AttemptRecord,
    ) -> anyhow::Result<Option<Job>>;

    /// PROCESSING -> PENDING for another whole-job attempt: append the
    /// attempt, increment `retry_count`, and push `scheduled_for` out.
    async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        attempt: AttemptRecord,
        scheduled_for: DateTime<Utc>,
    ) -> anyhow::Result<Option<Job>>;

    /// PROCESSING -> FAILED: append the attempt and record why the job is
    /// terminal.
    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        attempt: AttemptRecord,
        reason: TerminalReason,
    ) -> anyhow::Result<Option<Job>>;

    /// Manual FAILED -> PENDING, only while retry budget remains. The
    /// attempt history and `retry_count` are kept.
    async fn retry_failed(&self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<bool>;

    /// Any non-terminal state -> ABANDONED.
    async fn abandon(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn counts_by_status(&self) -> anyhow::Result<QueueStats>;

    /// Retention sweep: delete COMPLETED jobs finished before `cutoff`.
    async fn cleanup_completed(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}
