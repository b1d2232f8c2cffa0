//! Shared test helpers for queue tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ledgerflow_license::{ValidationResult, ValidationSource};
use ledgerflow_queue::{
    ExecuteError, JobExecutor, JobPayload, JobPriority, JobRequest, LicenseTier, Revalidator,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A valid online validation result for the given tier, carrying the
/// tier's default feature set.
pub fn valid_result(tier: LicenseTier) -> ValidationResult {
    ValidationResult {
        valid: true,
        source: Some(ValidationSource::Online),
        tier: Some(tier),
        features: tier.default_features(),
        remaining_offline_secs: None,
        error_code: None,
        user_message: None,
    }
}

/// An invalid validation result carrying the given error code.
pub fn invalid_result(code: &str) -> ValidationResult {
    ValidationResult {
        valid: false,
        source: None,
        tier: None,
        features: BTreeSet::new(),
        remaining_offline_secs: None,
        error_code: Some(code.to_string()),
        user_message: Some("license validation failed".into()),
    }
}

/// A plain request for a ledger export at the given priority.
pub fn request(priority: JobPriority) -> JobRequest {
    JobRequest::new(priority, JobPayload::new("ledger-export", vec![0x4c, 0x46]))
}

/// A normal-priority request gated on the given feature.
pub fn feature_request(feature: &str) -> JobRequest {
    JobRequest::new(
        JobPriority::Normal,
        JobPayload::requiring_feature("gated-export", Vec::new(), feature),
    )
}

/// Executor that records payload kinds and can be scripted to fail the
/// first N attempts or to stall past any timeout.
pub struct ScriptedExecutor {
    pub executed: Mutex<Vec<String>>,
    pub attempts: AtomicUsize,
    /// Attempts below this number fail with an executor error.
    pub fail_first: usize,
    /// Stall for this long before reporting success.
    pub stall: Option<Duration>,
}

impl ScriptedExecutor {
    pub fn succeeding() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_first: 0,
            stall: None,
        }
    }

    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Self::succeeding()
        }
    }

    pub fn stalling(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::succeeding()
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExecutor for ScriptedExecutor {
    async fn execute(&self, payload: &JobPayload) -> Result<(), ExecuteError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.executed
            .lock()
            .unwrap()
            .push(payload.kind.clone());
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if attempt < self.fail_first {
            return Err(ExecuteError::new("scripted failure"));
        }
        Ok(())
    }
}

/// Revalidator with a fixed verdict, counting how often it was asked.
pub struct FixedRevalidator {
    pub verdict: AtomicBool,
    pub calls: AtomicUsize,
}

impl FixedRevalidator {
    pub fn new(verdict: bool) -> Self {
        Self {
            verdict: AtomicBool::new(verdict),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Revalidator for FixedRevalidator {
    async fn revalidate(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.load(Ordering::SeqCst)
    }
}
