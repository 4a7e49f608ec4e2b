//! Dead letter records: failures tracked outside the ordinary job lifecycle.
//!
//! Entries here are not jobs and nothing executes them. A caller records a
//! failure that needs human review, an operator (or scheduled sweep)
//! explicitly retries or abandons it, and whatever re-attempts the
//! underlying operation lives elsewhere. Retrying only changes eligibility.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DeadLetterJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub error: String,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Earliest time a sweep should consider this entry again.
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetterJob {
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    pub job_type: String,
    pub payload: Value,
    pub error: String,
    pub max_retries: i32,
    /// Delay applied to the initial `next_retry_at`.
    pub retry_delay: Duration,
}

impl NewDeadLetter {
    pub fn new(job_type: impl Into<String>, payload: Value, error: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            error: error.into(),
            max_retries: 3,
            retry_delay: Duration::minutes(30),
        }
    }

    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay_minutes(mut self, minutes: i64) -> Self {
        self.retry_delay = Duration::minutes(minutes);
        self
    }
}

/// Eligibility buckets used by `list` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterState {
    /// `next_retry_at <= now` and retry budget remains.
    Pending,
    /// Retry budget exhausted; needs an operator decision.
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct DeadLetterFilter {
    pub job_type: Option<String>,
    pub state: Option<DeadLetterState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadLetterStats {
    pub total: i64,
    pub pending: i64,
    pub failed: i64,
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Record a failure; `next_retry_at` starts at now + `retry_delay`.
    async fn add(&self, entry: NewDeadLetter) -> anyhow::Result<Uuid>;

    async fn list(
        &self,
        filter: &DeadLetterFilter,
        limit: i64,
    ) -> anyhow::Result<Vec<DeadLetterJob>>;

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<DeadLetterJob>>;

    /// Manual retry: increments `retry_count` and resets `next_retry_at` to
    /// now. Returns `false` once the budget is exhausted.
    async fn retry(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Record one more failed re-attempt: increments `retry_count` without
    /// rescheduling.
    async fn mark_failed(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn remove(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn stats(&self) -> anyhow::Result<DeadLetterStats>;

    /// Delete exhausted entries last touched before `cutoff`.
    async fn cleanup(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}
