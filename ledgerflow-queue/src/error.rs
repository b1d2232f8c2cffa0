//! Error types for the job admission queue.

use crate::job::BlockReason;
use thiserror::Error;

/// Result type for admission operations.
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// A submission was rejected at admission time.
///
/// Terminal for that submission: the caller must resolve the condition
/// (reconnect, upgrade tier, split the batch) and resubmit. Never retried
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The job (or whole batch) was blocked with the given reason.
    #[error("job blocked: {0}")]
    Blocked(BlockReason),
}

impl AdmissionError {
    /// The block reason carried by this error.
    #[must_use]
    pub fn reason(&self) -> &BlockReason {
        match self {
            Self::Blocked(reason) => reason,
        }
    }
}

/// Failures during job execution. Retried per the backoff policy before
/// being surfaced as a terminal `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// The configured per-job processing timeout elapsed.
    #[error("processing timed out")]
    Timeout,

    /// The external executor reported a failure.
    #[error("executor failed: {0}")]
    Execution(String),

    /// All retry attempts were consumed.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made (initial + retries).
        attempts: u32,
        /// Message from the final failed attempt.
        last_error: String,
    },
}

/// An error reported by the external job executor.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ExecuteError(pub String);

impl ExecuteError {
    /// Creates an executor error from any displayable cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
