//! Polling worker: claims eligible jobs on a fixed interval and dispatches
//! them to processors with bounded concurrency.
//!
//! Concurrency is a semaphore shared across ticks, so
//! `processing_concurrency` is a true global in-flight cap. Claimed jobs run
//! as spawned tasks the loop does not await; stopping the worker only halts
//! future polling, and anything already dispatched runs to completion.
//! No single job's error is ever allowed to kill the poll loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::jobs::error::{ErrorKind, JobError};
use crate::jobs::model::{JobStatus, QueueStats};
use crate::jobs::queue::JobQueue;
use crate::jobs::registry::{ProcessorRegistry, ProcessorRequest};
use crate::jobs::retry::{run_with_retry, RetryOptions};

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerConfigSnapshot {
    pub poll_interval_ms: u64,
    pub processing_concurrency: usize,
    pub per_attempt_timeout_ms: u64,
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub in_flight: usize,
    pub stats: QueueStats,
    pub config: WorkerConfigSnapshot,
}

/// Handle returned by [`Worker::start`]. Owns the poll loop's cancellation
/// channel and task, so independent worker instances can coexist (e.g., in
/// tests) without shared globals.
pub struct WorkerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Halt future polling and wait for the loop to exit. In-flight jobs
    /// keep running on their own tasks.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.task.await;
    }
}

#[derive(Clone)]
pub struct Worker {
    queue: Arc<JobQueue>,
    registry: Arc<ProcessorRegistry>,
    config: QueueConfig,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(queue: Arc<JobQueue>, registry: Arc<ProcessorRegistry>, config: QueueConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.processing_concurrency.max(1)));
        Self {
            queue,
            registry,
            config,
            semaphore,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the poll loop and return the handle that owns it.
    pub fn start(&self) -> WorkerHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            processing_concurrency = self.config.processing_concurrency,
            "worker started"
        );

        let worker = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(worker.config.poll_interval_ms.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        worker.tick().await;
                    }
                }
            }

            worker.running.store(false, Ordering::SeqCst);
            tracing::info!("worker stopped");
        });

        WorkerHandle {
            cancel: cancel_tx,
            task,
            running: self.running.clone(),
        }
    }

    /// Run one poll tick out of band, without waiting for the next interval.
    pub async fn trigger_processing(&self) {
        self.tick().await;
    }

    pub async fn status(&self) -> anyhow::Result<WorkerStatus> {
        let stats = self.queue.get_queue_stats().await?;
        let concurrency = self.config.processing_concurrency.max(1);
        Ok(WorkerStatus {
            running: self.running.load(Ordering::SeqCst),
            in_flight: concurrency - self.semaphore.available_permits(),
            stats,
            config: WorkerConfigSnapshot {
                poll_interval_ms: self.config.poll_interval_ms,
                processing_concurrency: concurrency,
                per_attempt_timeout_ms: self.config.per_attempt_timeout_ms,
                lock_timeout_ms: self.config.lock_timeout_ms,
            },
        })
    }

    /// Poll the store until the job reaches a terminal status. `None` means
    /// the timeout elapsed first, which is distinct from the job failing.
    pub async fn wait_for_job_completion(
        &self,
        id: Uuid,
        timeout: Duration,
    ) -> anyhow::Result<Option<JobStatus>> {
        let deadline = Instant::now() + timeout;
        let poll = Duration::from_millis(self.config.wait_poll_interval_ms.max(1));

        loop {
            if let Some(job) = self.queue.get_job(id).await? {
                if job.status.is_terminal() {
                    return Ok(Some(job.status));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Claim and dispatch jobs until the in-flight cap or the claimable pool
    /// is exhausted.
    async fn tick(&self) {
        loop {
            let permit = match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::trace!("all worker slots occupied");
                    return;
                }
            };

            match self.queue.claim_next().await {
                Ok(Some(job)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        worker.execute_job(job).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    return;
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %format!("{e:#}"), "failed to claim job");
                    return;
                }
            }
        }
    }

    async fn execute_job(&self, job: crate::jobs::model::Job) {
        let start = std::time::Instant::now();
        let opts = self.attempt_options();

        let outcome = match self.registry.get(job.job_type) {
            Some(processor) => {
                let request = ProcessorRequest {
                    job_id: job.id,
                    job_type: job.job_type,
                    payload: job.payload.clone(),
                    attempt: job.retry_count + 1,
                };
                run_with_retry(|| processor(request.clone()), &opts).await
            }
            None => Err(JobError::new(
                ErrorKind::MissingProcessor,
                format!("no processor registered for {}", job.job_type),
            )),
        };

        let duration = start.elapsed();
        let recorded = match outcome {
            Ok(result) => self.queue.on_success(job.id, result, duration).await,
            Err(err) => self.queue.on_failure(job.id, &err, duration).await,
        };

        // The loop must survive anything a single job throws at it; a store
        // error while recording is logged and dropped.
        if let Err(e) = recorded {
            tracing::error!(
                job_id = %job.id,
                job_type = %job.job_type,
                error = %format!("{e:#}"),
                "failed to record job outcome"
            );
        }
    }

    /// Re-attempts of a whole job go through its own retry_count, so the
    /// in-attempt wrapper contributes only the per-attempt timeout and the
    /// error classification.
    fn attempt_options(&self) -> RetryOptions {
        RetryOptions {
            max_retries: 0,
            per_attempt_timeout: Duration::from_millis(self.config.per_attempt_timeout_ms.max(1)),
            ..RetryOptions::default()
        }
    }
}
