use crate::jobs::model::JobType;

/// Runtime configuration for the queue service and worker.
///
/// Loaded from environment variables (`COURSEFLOW_*`, with unprefixed
/// fallbacks) so the embedding application configures the subsystem the same
/// way it configures everything else; `Default` gives the documented
/// defaults for programmatic construction.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub database_url: Option<String>,
    /// Default whole-job retry budget applied at enqueue time.
    pub max_retries: i32,
    pub default_priority: i32,
    /// Global in-flight cap across poll ticks.
    pub processing_concurrency: usize,
    /// Advisory only: carried in worker status for dashboards.
    pub lock_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub per_attempt_timeout_ms: u64,
    /// How often `wait_for_job_completion` re-reads the store.
    pub wait_poll_interval_ms: u64,
    pub completed_retention_days: i64,
    /// Job types for which enqueue is an administrative no-op.
    pub disabled_job_types: Vec<String>,
    pub migrate_on_startup: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_retries: 3,
            default_priority: 3,
            processing_concurrency: 5,
            lock_timeout_ms: 30_000,
            poll_interval_ms: 5_000,
            per_attempt_timeout_ms: 60_000,
            wait_poll_interval_ms: 50,
            completed_retention_days: 7,
            disabled_job_types: Vec::new(),
            migrate_on_startup: false,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let max_retries =
            env_parsed("COURSEFLOW_MAX_RETRIES", "MAX_RETRIES").unwrap_or(defaults.max_retries);

        let default_priority = env_parsed("COURSEFLOW_DEFAULT_PRIORITY", "DEFAULT_PRIORITY")
            .unwrap_or(defaults.default_priority);

        let processing_concurrency =
            env_parsed("COURSEFLOW_PROCESSING_CONCURRENCY", "PROCESSING_CONCURRENCY")
                .unwrap_or(defaults.processing_concurrency);

        let lock_timeout_ms = env_parsed("COURSEFLOW_LOCK_TIMEOUT_MS", "LOCK_TIMEOUT_MS")
            .unwrap_or(defaults.lock_timeout_ms);

        let poll_interval_ms = env_parsed("COURSEFLOW_POLL_INTERVAL_MS", "POLL_INTERVAL_MS")
            .unwrap_or(defaults.poll_interval_ms);

        let per_attempt_timeout_ms =
            env_parsed("COURSEFLOW_PER_ATTEMPT_TIMEOUT_MS", "PER_ATTEMPT_TIMEOUT_MS")
                .unwrap_or(defaults.per_attempt_timeout_ms);

        let wait_poll_interval_ms =
            env_parsed("COURSEFLOW_WAIT_POLL_INTERVAL_MS", "WAIT_POLL_INTERVAL_MS")
                .unwrap_or(defaults.wait_poll_interval_ms);

        let completed_retention_days = env_parsed(
            "COURSEFLOW_COMPLETED_RETENTION_DAYS",
            "COMPLETED_RETENTION_DAYS",
        )
        .unwrap_or(defaults.completed_retention_days);

        let disabled_job_types =
            env_or_fallback("COURSEFLOW_DISABLED_JOB_TYPES", "DISABLED_JOB_TYPES")
                .map(|csv| {
                    csv.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();

        let migrate_on_startup = env_bool("COURSEFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        Ok(Self {
            database_url,
            max_retries,
            default_priority,
            processing_concurrency,
            lock_timeout_ms,
            poll_interval_ms,
            per_attempt_timeout_ms,
            wait_poll_interval_ms,
            completed_retention_days,
            disabled_job_types,
            migrate_on_startup,
        })
    }

    pub fn is_disabled(&self, job_type: JobType) -> bool {
        self.disabled_job_types
            .iter()
            .any(|t| t == job_type.as_str())
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_parsed<T: std::str::FromStr>(primary: &str, fallback: &str) -> Option<T> {
    env_or_fallback(primary, fallback).and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
