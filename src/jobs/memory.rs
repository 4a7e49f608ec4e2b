//! In-memory store implementations backed by a single mutex.
//!
//! Used by the test suite and by embedded deployments that do not need
//! durability. The mutex serializes every operation, so the claim's
//! select-then-mark is atomic by construction.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::jobs::dead_letter::{
    DeadLetterFilter, DeadLetterJob, DeadLetterState, DeadLetterStats, DeadLetterStore,
    NewDeadLetter,
};
use crate::jobs::model::{AttemptRecord, Job, JobStatus, NewJob, QueueStats, TerminalReason};
use crate::jobs::store::JobStore;

#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new_job: NewJob) -> anyhow::Result<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            job_type: new_job.job_type,
            status: JobStatus::Pending,
            payload: new_job.payload,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: new_job.max_retries,
            priority: new_job.priority,
            attempts: Vec::new(),
            scheduled_for: new_job.scheduled_for,
            started_at: None,
            completed_at: None,
            terminal_reason: None,
            created_at: now,
            updated_at: now,
        };

        let mut jobs = self.inner.lock().await;
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        let jobs = self.inner.lock().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn list_by_status(&self, status: JobStatus, limit: i64) -> anyhow::Result<Vec<Job>> {
        let jobs = self.inner.lock().await;
        let mut rows: Vec<Job> = jobs.values().filter(|j| j.status == status).cloned().collect();
        rows.sort_by_key(|j| (Reverse(j.priority), j.created_at, j.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> anyhow::Result<Option<Job>> {
        let mut jobs = self.inner.lock().await;

        let best = jobs
            .values()
            .filter(|j| j.status.is_claimable() && j.scheduled_for <= now)
            .min_by_key(|j| (Reverse(j.priority), j.created_at, j.id))
            .map(|j| j.id);

        let Some(id) = best else {
            return Ok(None);
        };

        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("claimed job {id} vanished"))?;
        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(
        &self,
        id: Uuid,
        result: Value,
        attempt: AttemptRecord,
    ) -> anyhow::Result<Option<Job>> {
        let mut jobs = self.inner.lock().await;
        let Some(job) = jobs.get_mut(&id).filter(|j| j.status == JobStatus::Processing) else {
            return Ok(None);
        };

        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.result = Some(result);
        job.attempts.push(attempt);
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        attempt: AttemptRecord,
        scheduled_for: DateTime<Utc>,
    ) -> anyhow::Result<Option<Job>> {
        let mut jobs = self.inner.lock().await;
        let Some(job) = jobs.get_mut(&id).filter(|j| j.status == JobStatus::Processing) else {
            return Ok(None);
        };

        job.status = JobStatus::Pending;
        job.error = Some(error.to_string());
        job.retry_count += 1;
        job.attempts.push(attempt);
        job.scheduled_for = scheduled_for;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        attempt: AttemptRecord,
        reason: TerminalReason,
    ) -> anyhow::Result<Option<Job>> {
        let mut jobs = self.inner.lock().await;
        let Some(job) = jobs.get_mut(&id).filter(|j| j.status == JobStatus::Processing) else {
            return Ok(None);
        };

        let now = Utc::now();
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.attempts.push(attempt);
        job.terminal_reason = Some(reason);
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn retry_failed(&self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut jobs = self.inner.lock().await;
        let Some(job) = jobs
            .get_mut(&id)
            .filter(|j| j.status == JobStatus::Failed && j.retry_count < j.max_retries)
        else {
            return Ok(false);
        };

        job.status = JobStatus::Pending;
        job.scheduled_for = now;
        job.terminal_reason = None;
        job.completed_at = None;
        job.updated_at = now;
        Ok(true)
    }

    async fn abandon(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut jobs = self.inner.lock().await;
        let Some(job) = jobs.get_mut(&id).filter(|j| !j.status.is_terminal()) else {
            return Ok(false);
        };

        job.status = JobStatus::Abandoned;
        job.terminal_reason = Some(TerminalReason::Abandoned);
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn counts_by_status(&self) -> anyhow::Result<QueueStats> {
        let jobs = self.inner.lock().await;
        let mut stats = QueueStats::default();
        for job in jobs.values() {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Retrying => stats.retrying += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Abandoned => stats.abandoned += 1,
            }
        }
        Ok(stats)
    }

    async fn cleanup_completed(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut jobs = self.inner.lock().await;
        let before = jobs.len();
        jobs.retain(|_, j| {
            !(j.status == JobStatus::Completed && j.completed_at.map_or(false, |t| t < cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }
}

#[derive(Clone, Default)]
pub struct MemoryDeadLetterStore {
    inner: Arc<Mutex<HashMap<Uuid, DeadLetterJob>>>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_state(entry: &DeadLetterJob, state: DeadLetterState, now: DateTime<Utc>) -> bool {
    match state {
        DeadLetterState::Pending => !entry.is_exhausted() && entry.next_retry_at <= now,
        DeadLetterState::Failed => entry.is_exhausted(),
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn add(&self, entry: NewDeadLetter) -> anyhow::Result<Uuid> {
        let now = Utc::now();
        let record = DeadLetterJob {
            id: Uuid::new_v4(),
            job_type: entry.job_type,
            payload: entry.payload,
            error: entry.error,
            retry_count: 0,
            max_retries: entry.max_retries,
            next_retry_at: now + entry.retry_delay,
            created_at: now,
            updated_at: now,
        };

        let mut entries = self.inner.lock().await;
        let id = record.id;
        entries.insert(id, record);
        Ok(id)
    }

    async fn list(
        &self,
        filter: &DeadLetterFilter,
        limit: i64,
    ) -> anyhow::Result<Vec<DeadLetterJob>> {
        let now = Utc::now();
        let entries = self.inner.lock().await;
        let mut rows: Vec<DeadLetterJob> = entries
            .values()
            .filter(|e| {
                filter
                    .job_type
                    .as_deref()
                    .map_or(true, |t| e.job_type == t)
                    && filter.state.map_or(true, |s| matches_state(e, s, now))
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| Reverse(e.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<DeadLetterJob>> {
        let entries = self.inner.lock().await;
        Ok(entries.get(&id).cloned())
    }

    async fn retry(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut entries = self.inner.lock().await;
        let Some(entry) = entries.get_mut(&id).filter(|e| !e.is_exhausted()) else {
            return Ok(false);
        };

        let now = Utc::now();
        entry.retry_count += 1;
        entry.next_retry_at = now;
        entry.updated_at = now;
        Ok(true)
    }

    async fn mark_failed(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut entries = self.inner.lock().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(false);
        };

        entry.retry_count += 1;
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn remove(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut entries = self.inner.lock().await;
        Ok(entries.remove(&id).is_some())
    }

    async fn stats(&self) -> anyhow::Result<DeadLetterStats> {
        let now = Utc::now();
        let entries = self.inner.lock().await;
        let mut stats = DeadLetterStats::default();
        for entry in entries.values() {
            stats.total += 1;
            if matches_state(entry, DeadLetterState::Failed, now) {
                stats.failed += 1;
            } else if matches_state(entry, DeadLetterState::Pending, now) {
                stats.pending += 1;
            }
        }
        Ok(stats)
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut entries = self.inner.lock().await;
        let before = entries.len();
        entries.retain(|_, e| !(e.is_exhausted() && e.updated_at < cutoff));
        Ok((before - entries.len()) as u64)
    }
}
