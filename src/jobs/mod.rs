pub mod dead_letter;
pub mod error;
pub mod memory;
pub mod model;
pub mod pg;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod store;
pub mod worker;

pub use dead_letter::{
    DeadLetterFilter, DeadLetterJob, DeadLetterState, DeadLetterStats, DeadLetterStore,
    NewDeadLetter,
};
pub use error::{ErrorKind, JobError};
pub use memory::{MemoryDeadLetterStore, MemoryJobStore};
pub use model::{
    AttemptRecord, EnqueueOptions, Job, JobStatus, JobType, NewJob, QueueStats, TerminalReason,
};
pub use pg::{PgDeadLetterStore, PgJobStore};
pub use queue::{cutoff_days, JobQueue};
pub use registry::{build_registry, ProcessorRegistry, ProcessorRequest};
pub use retry::{backoff_delay, run_with_retry, RetryOptions};
pub use store::JobStore;
pub use worker::{Worker, WorkerHandle, WorkerStatus};
