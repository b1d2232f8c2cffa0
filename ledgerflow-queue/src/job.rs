//! Job records and block reasons.

use chrono::{DateTime, Utc};
use ledgerflow_types::{JobId, JobPriority, JobState, LicenseTier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque work payload handed to the external executor.
///
/// The queue never inspects `data`; `kind` and `required_feature` exist
/// only for routing and admission gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Producer-defined payload kind (e.g. "invoice-export").
    pub kind: String,
    /// Opaque payload bytes or reference.
    pub data: Vec<u8>,
    /// Feature the license must grant for this job to be admitted.
    pub required_feature: Option<String>,
}

impl JobPayload {
    /// Creates a payload with no feature requirement.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            data,
            required_feature: None,
        }
    }

    /// Creates a payload gated on a named feature.
    #[must_use]
    pub fn requiring_feature(
        kind: impl Into<String>,
        data: Vec<u8>,
        feature: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            data,
            required_feature: Some(feature.into()),
        }
    }
}

/// A submission handed to the queue; becomes a [`Job`] at admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Requested priority bucket.
    pub priority: JobPriority,
    /// The work payload.
    pub payload: JobPayload,
}

impl JobRequest {
    /// Creates a request at the given priority.
    #[must_use]
    pub fn new(priority: JobPriority, payload: JobPayload) -> Self {
        Self { priority, payload }
    }
}

/// A job tracked by the admission queue.
///
/// `tier_at_submission` is frozen for the job's lifetime: a tier change
/// affects subsequent admissions only, never jobs already queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Queue-assigned identifier.
    pub id: JobId,
    /// Priority bucket the job was admitted into.
    pub priority: JobPriority,
    /// The work payload.
    pub payload: JobPayload,
    /// License tier in effect when the job was admitted.
    pub tier_at_submission: LicenseTier,
    /// Current lifecycle state.
    pub state: JobState,
    /// Why the job is blocked, for terminal `Blocked` jobs.
    pub block_reason: Option<BlockReason>,
    /// Number of retry attempts consumed so far.
    pub retry_count: u32,
    /// When the job was admitted.
    pub created_at: DateTime<Utc>,
    /// When processing first started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a Pending job from an admitted request.
    #[must_use]
    pub fn admitted(request: JobRequest, tier: LicenseTier, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            priority: request.priority,
            payload: request.payload,
            tier_at_submission: tier,
            state: JobState::Pending,
            block_reason: None,
            retry_count: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Why a submission was blocked, in admission precedence order.
///
/// Every variant carries a stable machine-readable [`code`](Self::code)
/// and a human-readable `Display` message, so the UI needs no separate
/// mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// No valid license is available at all.
    NoLicense,
    /// The license (or its offline grace) has expired.
    LicenseExpired,
    /// The license was revoked by the authority.
    LicenseRevoked,
    /// The license is suspended.
    LicenseSuspended,
    /// The job requires a feature the license does not grant.
    FeatureNotAvailable {
        /// The missing feature.
        feature: String,
    },
    /// The batch exceeds the tier's per-call ceiling; nothing from the
    /// batch was admitted.
    BatchSizeExceeded {
        /// Jobs in the submitted batch.
        submitted: usize,
        /// The tier's batch ceiling.
        limit: u32,
    },
    /// Admitting now would exceed the tier's concurrent-processing
    /// ceiling.
    RateLimitExceeded {
        /// The tier's concurrency ceiling.
        limit: u32,
    },
    /// The queue is shutting down and no longer accepts or runs work.
    ShutdownRequested,
}

impl BlockReason {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoLicense => "no_license",
            Self::LicenseExpired => "license_expired",
            Self::LicenseRevoked => "license_revoked",
            Self::LicenseSuspended => "license_suspended",
            Self::FeatureNotAvailable { .. } => "feature_not_available",
            Self::BatchSizeExceeded { .. } => "batch_size_exceeded",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::ShutdownRequested => "shutdown_requested",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLicense => write!(f, "no valid license is available"),
            Self::LicenseExpired => write!(f, "the license has expired"),
            Self::LicenseRevoked => write!(f, "the license has been revoked"),
            Self::LicenseSuspended => write!(f, "the license is suspended"),
            Self::FeatureNotAvailable { feature } => {
                write!(f, "this job requires the '{feature}' feature, which the current license does not include")
            }
            Self::BatchSizeExceeded { submitted, limit } => {
                write!(f, "batch of {submitted} jobs exceeds the tier limit of {limit}")
            }
            Self::RateLimitExceeded { limit } => {
                write!(f, "the tier's concurrent processing limit of {limit} is in use")
            }
            Self::ShutdownRequested => write!(f, "the application is shutting down"),
        }
    }
}
