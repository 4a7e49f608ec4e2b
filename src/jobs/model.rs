use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed catalog of job types the storefront defers to the queue.
///
/// Each variant has exactly one processor registered for it; adding a new
/// job type means adding a variant here and a processor in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    EmailSend,
    EnrollmentConfirmation,
    PaymentVerify,
    ExternalSync,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::EmailSend => "email_send",
            JobType::EnrollmentConfirmation => "enrollment_confirmation",
            JobType::PaymentVerify => "payment_verify",
            JobType::ExternalSync => "external_sync",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email_send" => Some(JobType::EmailSend),
            "enrollment_confirmation" => Some(JobType::EnrollmentConfirmation),
            "payment_verify" => Some(JobType::PaymentVerify),
            "external_sync" => Some(JobType::ExternalSync),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
    Abandoned,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "retrying" => Some(JobStatus::Retrying),
            "abandoned" => Some(JobStatus::Abandoned),
            _ => None,
        }
    }

    /// Terminal jobs are never claimed or transitioned again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Abandoned
        )
    }

    /// Claimable once `scheduled_for` has passed.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Retrying)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job reached a terminal failure state. Stored alongside `status` so
/// operators can tell budget exhaustion from an explicitly fatal error
/// without scanning the attempts log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    RetriesExhausted,
    NonRetryable,
    Abandoned,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::RetriesExhausted => "retries_exhausted",
            TerminalReason::NonRetryable => "non_retryable",
            TerminalReason::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "retries_exhausted" => Some(TerminalReason::RetriesExhausted),
            "non_retryable" => Some(TerminalReason::NonRetryable),
            "abandoned" => Some(TerminalReason::Abandoned),
            _ => None,
        }
    }
}

/// One entry of the append-only attempt audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub priority: i32,
    pub attempts: Vec<AttemptRecord>,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub terminal_reason: Option<TerminalReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub payload: Value,
    pub priority: i32,
    pub max_retries: i32,
    pub scheduled_for: DateTime<Utc>,
}

/// Per-call overrides accepted by `enqueue`; anything left `None` falls back
/// to the queue config defaults.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub priority: Option<i32>,
    pub max_retries: Option<i32>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Aggregate job counts grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub retrying: i64,
    pub completed: i64,
    pub failed: i64,
    pub abandoned: i64,
}
