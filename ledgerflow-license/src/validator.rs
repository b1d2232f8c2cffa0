//! License validation orchestration.
//!
//! Policy, in order:
//! 1. Unless forced offline, validate online: the authority issues a fresh
//!    token reflecting current status. Success persists the token and
//!    resets the grace clock.
//! 2. If the authority is unreachable, fall back to the cached token,
//!    provided its audience still matches the current fingerprint. The
//!    grace period manager bounds how long this keeps working.
//! 3. An explicit server rejection wins over any still-valid cache:
//!    reachability implies authority.

use crate::authority::{AuthorityError, LicenseAuthority};
use crate::cache::{CacheStore, CachedLicense};
use crate::error::{TokenError, ValidateResult, ValidationError};
use crate::grace::{GraceEvent, GraceLevel, GracePeriodManager};
use crate::token::{TokenClaims, TokenService};
use crate::DeviceFingerprint;
use chrono::{DateTime, Utc};
use ledgerflow_types::LicenseTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where a validation verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationSource {
    /// Fresh verdict from the license authority.
    Online,
    /// Verdict derived from the cached token while offline.
    CachedOffline,
}

/// The outcome of a `validate()` call. Never mutated after return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the license is currently usable.
    pub valid: bool,
    /// Where the verdict came from; absent for invalid results that never
    /// reached a verdict source.
    pub source: Option<ValidationSource>,
    /// Validated tier, when known.
    pub tier: Option<LicenseTier>,
    /// Features granted by the validated token.
    pub features: BTreeSet<String>,
    /// Offline allowance remaining, for cached-offline verdicts.
    pub remaining_offline_secs: Option<i64>,
    /// Machine-readable failure code, for invalid results.
    pub error_code: Option<String>,
    /// Human-readable failure message, for invalid results.
    pub user_message: Option<String>,
}

impl ValidationResult {
    fn online(claims: &TokenClaims) -> Self {
        Self {
            valid: true,
            source: Some(ValidationSource::Online),
            tier: Some(claims.tier),
            features: claims.features.clone(),
            remaining_offline_secs: None,
            error_code: None,
            user_message: None,
        }
    }

    fn cached_offline(claims: &TokenClaims, remaining_offline_secs: i64) -> Self {
        Self {
            valid: true,
            source: Some(ValidationSource::CachedOffline),
            tier: Some(claims.tier),
            features: claims.features.clone(),
            remaining_offline_secs: Some(remaining_offline_secs),
            error_code: None,
            user_message: None,
        }
    }

    fn invalid(error: &ValidationError) -> Self {
        Self {
            valid: false,
            source: None,
            tier: None,
            features: BTreeSet::new(),
            remaining_offline_secs: None,
            error_code: Some(error.code().to_string()),
            user_message: Some(error.to_string()),
        }
    }

    /// Strict membership check against the validated feature set, used by
    /// callers to gate optional capabilities.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.valid && self.features.contains(name)
    }
}

/// Per-call validation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Skip the online attempt and validate from the cache only.
    pub force_offline: bool,
}

/// Orchestrates online and offline license validation.
pub struct LicenseValidator {
    token_service: TokenService,
    cache: CacheStore,
    authority: Arc<dyn LicenseAuthority>,
    grace: Mutex<GracePeriodManager>,
}

impl LicenseValidator {
    /// Creates a validator. The grace allowance starts at the Standard
    /// tier's and follows the validated tier afterwards.
    #[must_use]
    pub fn new(
        token_service: TokenService,
        cache: CacheStore,
        authority: Arc<dyn LicenseAuthority>,
    ) -> Self {
        Self {
            token_service,
            cache,
            authority,
            grace: Mutex::new(GracePeriodManager::new(LicenseTier::Standard)),
        }
    }

    /// Validates the license for this device.
    pub async fn validate(
        &self,
        license_key: &str,
        fingerprint: &DeviceFingerprint,
        options: ValidateOptions,
    ) -> ValidationResult {
        self.validate_at(license_key, fingerprint, options, Utc::now())
            .await
    }

    /// Validates at an explicit point in time (deterministic tests).
    pub async fn validate_at(
        &self,
        license_key: &str,
        fingerprint: &DeviceFingerprint,
        options: ValidateOptions,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        if !options.force_offline {
            match self.authority.issue(license_key, fingerprint.hash()).await {
                Ok(issued) => {
                    return self.accept_online(&issued.token, fingerprint, now).await;
                }
                Err(AuthorityError::Rejected(reason)) => {
                    // Server state wins over any cached token.
                    info!(%reason, "authority rejected license");
                    self.grace.lock().await.record_server_rejection(now);
                    if let Err(e) = self.cache.clear() {
                        warn!(error = %e, "failed to discard rejected license cache");
                    }
                    return ValidationResult::invalid(&ValidationError::ServerRejected(reason));
                }
                Err(AuthorityError::Unreachable(e)) | Err(AuthorityError::Malformed(e)) => {
                    debug!(error = %e, "authority unreachable, trying cached license");
                }
            }
        }
        self.validate_offline(fingerprint, now).await
    }

    /// Discards the cached token (logout/deactivation).
    pub fn deactivate(&self) -> ValidateResult<()> {
        info!("discarding cached license");
        self.cache.clear()
    }

    /// Current grace warning level.
    pub async fn grace_level(&self) -> GraceLevel {
        self.grace.lock().await.level()
    }

    /// Subscribes to grace level-change events.
    pub async fn subscribe_grace(&self) -> broadcast::Receiver<GraceEvent> {
        self.grace.lock().await.subscribe()
    }

    async fn accept_online(
        &self,
        raw_token: &str,
        fingerprint: &DeviceFingerprint,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let claims = match self
            .token_service
            .verify_at(raw_token, fingerprint.hash(), now)
        {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "authority issued a token that does not verify");
                return ValidationResult::invalid(&ValidationError::Token(e));
            }
        };

        let record = CachedLicense {
            token: raw_token.to_string(),
            fingerprint_hash: fingerprint.hash().to_string(),
            last_online_validation_at: now,
        };
        // A cache write failure degrades offline resilience but does not
        // invalidate the online verdict.
        if let Err(e) = self.cache.store(&record) {
            warn!(error = %e, "failed to persist license cache");
        }

        let mut grace = self.grace.lock().await;
        grace.set_allowance_secs(claims.tier.offline_allowance_secs(), now);
        grace.record_online_success(now);
        info!(tier = %claims.tier, license = %claims.sub, "license validated online");
        ValidationResult::online(&claims)
    }

    async fn validate_offline(
        &self,
        fingerprint: &DeviceFingerprint,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let cached = match self.cache.load() {
            Ok(Some(cached)) => cached,
            Ok(None) => return ValidationResult::invalid(&ValidationError::NoCachedLicense),
            Err(e) => {
                warn!(error = %e, "failed to read license cache");
                return ValidationResult::invalid(&ValidationError::NoCachedLicense);
            }
        };

        // A cached verdict is trusted only while its audience equals the
        // current fingerprint. Any mismatch invalidates the cache.
        if cached.fingerprint_hash != fingerprint.hash() {
            warn!("cached license bound to a different fingerprint, purging cache");
            if let Err(e) = self.cache.clear() {
                warn!(error = %e, "failed to purge mismatched license cache");
            }
            return ValidationResult::invalid(&ValidationError::Token(
                TokenError::AudienceMismatch,
            ));
        }

        let claims = match self
            .token_service
            .verify_at(&cached.token, fingerprint.hash(), now)
        {
            Ok(claims) => claims,
            Err(e) => return ValidationResult::invalid(&ValidationError::Token(e)),
        };

        let mut grace = self.grace.lock().await;
        grace.set_allowance_secs(claims.tier.offline_allowance_secs(), now);
        // After a restart the manager is fresh; resume the offline stretch
        // from the persisted online validation instead of granting a full
        // allowance again.
        grace.restore_last_online(cached.last_online_validation_at, now);
        if !grace.record_offline_success(now) {
            return ValidationResult::invalid(&ValidationError::OfflineGraceExpired);
        }
        let remaining = grace.remaining_secs(now);
        debug!(
            tier = %claims.tier,
            remaining_offline_secs = remaining,
            "license validated from cache"
        );
        ValidationResult::cached_offline(&claims, remaining)
    }
}
