//! Job priorities and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority of a job in the admission queue.
///
/// The derived order is lowest-first (`Low < Normal < High < Critical`),
/// so `max()` picks the most urgent priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// Background work, drained last.
    Low,
    /// Default priority.
    Normal,
    /// User-visible work.
    High,
    /// Drained before everything else.
    Critical,
}

impl JobPriority {
    /// All priorities in drain order (most urgent first).
    pub const DRAIN_ORDER: [Self; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    /// Stable lowercase name, matching the serde representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// `Completed`, `Failed`, and `Blocked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Admitted, waiting in a priority bucket.
    Pending,
    /// Rejected at admission or during shutdown; terminal.
    Blocked,
    /// Picked up by a worker slot.
    Processing,
    /// Executed successfully; terminal.
    Completed,
    /// Retries exhausted or non-retryable failure; terminal.
    Failed,
}

impl JobState {
    /// Returns true if the job will never change state again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Blocked | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_lowest_first() {
        assert!(JobPriority::Low < JobPriority::Normal);
        assert!(JobPriority::Normal < JobPriority::High);
        assert!(JobPriority::High < JobPriority::Critical);
    }

    #[test]
    fn drain_order_is_most_urgent_first() {
        let mut sorted = JobPriority::DRAIN_ORDER;
        sorted.sort();
        sorted.reverse();
        assert_eq!(sorted, JobPriority::DRAIN_ORDER);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(JobState::Blocked.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }
}
