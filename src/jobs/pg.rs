//! Postgres-backed store implementations.
//!
//! The claim path is a short transaction: SELECT ... FOR UPDATE SKIP LOCKED
//! picks the best eligible row, then the locked row is flipped to
//! `processing`. Two concurrent claimers can never both take the same job.
//! All other transitions are single conditional UPDATEs keyed by id, so the
//! WHERE clause carries the state-machine precondition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::dead_letter::{
    DeadLetterFilter, DeadLetterJob, DeadLetterState, DeadLetterStats, DeadLetterStore,
    NewDeadLetter,
};
use crate::jobs::model::{
    AttemptRecord, Job, JobStatus, JobType, NewJob, QueueStats, TerminalReason,
};
use crate::jobs::store::JobStore;

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    status: String,
    payload: Value,
    result: Option<Value>,
    error: Option<String>,
    retry_count: i32,
    max_retries: i32,
    priority: i32,
    attempts: Value,
    scheduled_for: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    terminal_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> anyhow::Result<Job> {
        let job_type = JobType::parse(&self.job_type)
            .ok_or_else(|| anyhow::anyhow!("unknown job_type '{}' for job {}", self.job_type, self.id))?;
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| anyhow::anyhow!("unknown status '{}' for job {}", self.status, self.id))?;
        let terminal_reason = match self.terminal_reason.as_deref() {
            Some(s) => Some(TerminalReason::parse(s).ok_or_else(|| {
                anyhow::anyhow!("unknown terminal_reason '{s}' for job {}", self.id)
            })?),
            None => None,
        };
        let attempts: Vec<AttemptRecord> = serde_json::from_value(self.attempts)?;

        Ok(Job {
            id: self.id,
            job_type,
            status,
            payload: self.payload,
            result: self.result,
            error: self.error,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            priority: self.priority,
            attempts,
            scheduled_for: self.scheduled_for,
            started_at: self.started_at,
            completed_at: self.completed_at,
            terminal_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn attempt_json(attempt: &AttemptRecord) -> anyhow::Result<Value> {
    // Bound as a one-element array so `attempts || $n::jsonb` appends.
    Ok(json!([serde_json::to_value(attempt)?]))
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new_job: NewJob) -> anyhow::Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (job_type, status, payload, retry_count, max_retries, priority, attempts, scheduled_for)
            VALUES ($1, 'pending', $2, 0, $3, $4, '[]'::jsonb, $5)
            RETURNING *
            "#,
        )
        .bind(new_job.job_type.as_str())
        .bind(&new_job.payload)
        .bind(new_job.max_retries)
        .bind(new_job.priority)
        .bind(new_job.scheduled_for)
        .fetch_one(&self.pool)
        .await?;

        row.into_job()
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn list_by_status(&self, status: JobStatus, limit: i64) -> anyhow::Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT *
            FROM jobs
            WHERE status = $1
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(status.as_str())
        .bind(limit.clamp(0, 500))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> anyhow::Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM jobs
            WHERE status IN ('pending', 'retrying')
              AND scheduled_for <= $1
            ORDER BY priority DESC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'processing',
                started_at = $2,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row.into_job()?))
    }

    async fn complete(
        &self,
        id: Uuid,
        result: Value,
        attempt: AttemptRecord,
    ) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'completed',
                result = $2,
                attempts = attempts || $3::jsonb,
                completed_at = now(),
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(result)
        .bind(attempt_json(&attempt)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        attempt: AttemptRecord,
        scheduled_for: DateTime<Utc>,
    ) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'pending',
                error = $2,
                attempts = attempts || $3::jsonb,
                retry_count = retry_count + 1,
                scheduled_for = $4,
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(attempt_json(&attempt)?)
        .bind(scheduled_for)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        attempt: AttemptRecord,
        reason: TerminalReason,
    ) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error = $2,
                attempts = attempts || $3::jsonb,
                terminal_reason = $4,
                completed_at = now(),
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(attempt_json(&attempt)?)
        .bind(reason.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn retry_failed(&self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                scheduled_for = $2,
                terminal_reason = NULL,
                completed_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND status = 'failed'
              AND retry_count < max_retries
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn abandon(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'abandoned',
                terminal_reason = 'abandoned',
                updated_at = now()
            WHERE id = $1
              AND status IN ('pending', 'processing', 'retrying')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn counts_by_status(&self) -> anyhow::Result<QueueStats> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.total += count;
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Processing) => stats.processing = count,
                Some(JobStatus::Retrying) => stats.retrying = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                Some(JobStatus::Abandoned) => stats.abandoned = count,
                None => {}
            }
        }
        Ok(stats)
    }

    async fn cleanup_completed(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status = 'completed'
              AND completed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}

// ----------------------------
// Dead letter store
// ----------------------------

#[derive(Clone)]
pub struct PgDeadLetterStore {
    pool: PgPool,
}

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeadLetterRow {
    id: Uuid,
    job_type: String,
    payload: Value,
    error: String,
    retry_count: i32,
    max_retries: i32,
    next_retry_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeadLetterRow> for DeadLetterJob {
    fn from(row: DeadLetterRow) -> Self {
        DeadLetterJob {
            id: row.id,
            job_type: row.job_type,
            payload: row.payload,
            error: row.error,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            next_retry_at: row.next_retry_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn add(&self, entry: NewDeadLetter) -> anyhow::Result<Uuid> {
        let next_retry_at = Utc::now() + entry.retry_delay;
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO dead_letter_jobs (job_type, payload, error, retry_count, max_retries, next_retry_at)
            VALUES ($1, $2, $3, 0, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&entry.job_type)
        .bind(&entry.payload)
        .bind(&entry.error)
        .bind(entry.max_retries)
        .bind(next_retry_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list(
        &self,
        filter: &DeadLetterFilter,
        limit: i64,
    ) -> anyhow::Result<Vec<DeadLetterJob>> {
        let limit = limit.clamp(0, 500);
        let job_type = filter.job_type.as_deref();

        let rows = match filter.state {
            None => {
                sqlx::query_as::<_, DeadLetterRow>(
                    r#"
                    SELECT *
                    FROM dead_letter_jobs
                    WHERE ($1::text IS NULL OR job_type = $1)
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(job_type)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Some(DeadLetterState::Pending) => {
                sqlx::query_as::<_, DeadLetterRow>(
                    r#"
                    SELECT *
                    FROM dead_letter_jobs
                    WHERE ($1::text IS NULL OR job_type = $1)
                      AND retry_count < max_retries
                      AND next_retry_at <= now()
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(job_type)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Some(DeadLetterState::Failed) => {
                sqlx::query_as::<_, DeadLetterRow>(
                    r#"
                    SELECT *
                    FROM dead_letter_jobs
                    WHERE ($1::text IS NULL OR job_type = $1)
                      AND retry_count >= max_retries
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(job_type)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(DeadLetterJob::from).collect())
    }

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<DeadLetterJob>> {
        let row = sqlx::query_as::<_, DeadLetterRow>("SELECT * FROM dead_letter_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(DeadLetterJob::from))
    }

    async fn retry(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE dead_letter_jobs
            SET retry_count = retry_count + 1,
                next_retry_at = now(),
                updated_at = now()
            WHERE id = $1
              AND retry_count < max_retries
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE dead_letter_jobs
            SET retry_count = retry_count + 1,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn remove(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM dead_letter_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn stats(&self) -> anyhow::Result<DeadLetterStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letter_jobs")
            .fetch_one(&self.pool)
            .await?;

        let pending: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM dead_letter_jobs
            WHERE retry_count < max_retries
              AND next_retry_at <= now()
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let failed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM dead_letter_jobs WHERE retry_count >= max_retries",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DeadLetterStats {
            total,
            pending,
            failed,
        })
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM dead_letter_jobs
            WHERE retry_count >= max_retries
              AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}
