//! Retry scheduling with exponential backoff.
//!
//! Failed attempts are stored as records with a `next_attempt_at`
//! timestamp and re-queued by a scheduler tick. No timer sleeps: the
//! schedule is a plain data structure, so retry behavior is
//! deterministically testable.

use crate::job::Job;
use chrono::{DateTime, Duration, Utc};

/// Cap on the backoff exponent; beyond this the delay stops doubling.
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Delay before retry `attempt` (1-based), doubling per attempt.
#[must_use]
pub fn backoff_delay_ms(base_delay_ms: u64, attempt: u32) -> u64 {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    base_delay_ms.saturating_mul(1u64 << shift)
}

/// A job waiting for its next retry attempt.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    /// The job to re-run.
    pub job: Job,
    /// Earliest time the next attempt may start.
    pub next_attempt_at: DateTime<Utc>,
}

/// Pending retries, drained by [`take_due`](Self::take_due).
#[derive(Debug, Default)]
pub struct RetrySchedule {
    entries: Vec<RetryEntry>,
}

impl RetrySchedule {
    /// Creates an empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a retry for `job` after the backoff delay for its
    /// current attempt count.
    pub fn schedule(&mut self, job: Job, base_delay_ms: u64, now: DateTime<Utc>) {
        let delay_ms = backoff_delay_ms(base_delay_ms, job.retry_count);
        let next_attempt_at = now + Duration::milliseconds(delay_ms as i64);
        self.entries.push(RetryEntry {
            job,
            next_attempt_at,
        });
    }

    /// Removes and returns every job whose retry time has arrived.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let mut due = Vec::new();
        self.entries.retain_mut(|entry| {
            if entry.next_attempt_at <= now {
                due.push(entry.job.clone());
                false
            } else {
                true
            }
        });
        due
    }

    /// Removes a scheduled retry by job id, returning the job if found.
    pub fn remove(&mut self, id: ledgerflow_types::JobId) -> Option<Job> {
        let pos = self.entries.iter().position(|e| e.job.id == id)?;
        Some(self.entries.remove(pos).job)
    }

    /// Removes and returns all scheduled retries (shutdown path).
    pub fn drain_all(&mut self) -> Vec<Job> {
        self.entries.drain(..).map(|e| e.job).collect()
    }

    /// Number of jobs waiting for a retry slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no retries are scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a scheduled job by id.
    #[must_use]
    pub fn get(&self, id: ledgerflow_types::JobId) -> Option<&Job> {
        self.entries.iter().find(|e| e.job.id == id).map(|e| &e.job)
    }
}
