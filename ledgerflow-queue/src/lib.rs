//! License-gated job admission and scheduling for LedgerFlow.
//!
//! Every submission passes an admission check against the current
//! license validation before it may wait for a worker slot:
//!
//! 1. License validity (revoked, suspended, expired, absent).
//! 2. Feature entitlement for the payload's required feature.
//! 3. Batch size against the tier's per-call ceiling.
//! 4. Concurrency ceiling, for the immediate-admission path.
//!
//! Admitted jobs drain in strict priority order with FIFO within a
//! priority, run under a processing timeout, and retry with exponential
//! backoff. A job's tier entitlements are frozen at submission.

mod error;
mod job;
mod queue;
mod retry;
mod worker;

pub use error::{AdmissionError, AdmissionResult, ExecuteError, ProcessingError};
pub use job::{BlockReason, Job, JobPayload, JobRequest};
pub use queue::{JobEvent, JobQueue, QueueConfig};
pub use retry::{backoff_delay_ms, RetryEntry, RetrySchedule};
pub use worker::{JobExecutor, Revalidator, WorkerConfig, WorkerPool};

pub use ledgerflow_types::{JobId, JobPriority, JobState, LicenseTier};
