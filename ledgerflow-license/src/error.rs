//! Error types for the licensing crate.
//!
//! Every terminal failure carries a stable machine-readable code (see
//! [`codes`]) alongside its human-readable `Display` message, so UI layers
//! need no separate mapping table.

use thiserror::Error;

/// Stable machine-readable error codes surfaced in `ValidationResult`.
pub mod codes {
    /// No hardware identifier class was available for fingerprinting.
    pub const INSUFFICIENT_IDENTIFIERS: &str = "insufficient_identifiers";
    /// Token structure was not three base64url segments.
    pub const TOKEN_MALFORMED: &str = "token_malformed";
    /// Token MAC did not verify.
    pub const TOKEN_INVALID_SIGNATURE: &str = "token_invalid_signature";
    /// Token `exp` claim is in the past.
    pub const TOKEN_EXPIRED: &str = "token_expired";
    /// Token `nbf` claim is in the future.
    pub const TOKEN_NOT_YET_VALID: &str = "token_not_yet_valid";
    /// Token audience does not match the current device fingerprint.
    pub const TOKEN_AUDIENCE_MISMATCH: &str = "token_audience_mismatch";
    /// No cached license exists for offline validation.
    pub const NO_CACHED_LICENSE: &str = "no_cached_license";
    /// The license authority could not be reached.
    pub const NETWORK_UNAVAILABLE: &str = "network_unavailable";
    /// The authority rejected the license as revoked.
    pub const LICENSE_REVOKED: &str = "license_revoked";
    /// The authority rejected the license as suspended.
    pub const LICENSE_SUSPENDED: &str = "license_suspended";
    /// The authority rejected the license as expired.
    pub const LICENSE_EXPIRED: &str = "license_expired";
    /// The offline grace allowance has run out.
    pub const OFFLINE_GRACE_EXPIRED: &str = "offline_grace_expired";
}

/// Result type for fingerprinting operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors from device fingerprinting. Never retried: retrying cannot add
/// hardware identifiers.
#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    /// No identifier class (machine UUID, machine id, MAC, storage or
    /// firmware serial) was available.
    #[error("no hardware identifiers available on this device")]
    InsufficientIdentifiers,
}

impl IdentityError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientIdentifiers => codes::INSUFFICIENT_IDENTIFIERS,
        }
    }
}

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

/// Errors from license token creation and verification.
/// Surfaced synchronously; never retried.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// Token is not three dot-separated base64url segments, or a segment
    /// failed to decode.
    #[error("malformed license token: {0}")]
    Malformed(String),

    /// The keyed MAC did not verify; no claim is trusted.
    #[error("license token signature invalid")]
    InvalidSignature,

    /// The token's `exp` claim is in the past.
    #[error("license token expired at {0}")]
    Expired(chrono::DateTime<chrono::Utc>),

    /// The token's `nbf` claim is in the future.
    #[error("license token not valid before {0}")]
    NotYetValid(chrono::DateTime<chrono::Utc>),

    /// The token is bound to a different device fingerprint.
    #[error("license token was issued for a different device")]
    AudienceMismatch,
}

impl TokenError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => codes::TOKEN_MALFORMED,
            Self::InvalidSignature => codes::TOKEN_INVALID_SIGNATURE,
            Self::Expired(_) => codes::TOKEN_EXPIRED,
            Self::NotYetValid(_) => codes::TOKEN_NOT_YET_VALID,
            Self::AudienceMismatch => codes::TOKEN_AUDIENCE_MISMATCH,
        }
    }
}

/// Reason the authority explicitly rejected a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionReason {
    /// License was revoked by the authority.
    Revoked,
    /// License is temporarily suspended (e.g. payment failure).
    Suspended,
    /// License subscription has expired.
    Expired,
}

impl RejectionReason {
    /// Stable machine-readable code for this rejection.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Revoked => codes::LICENSE_REVOKED,
            Self::Suspended => codes::LICENSE_SUSPENDED,
            Self::Expired => codes::LICENSE_EXPIRED,
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Revoked => "revoked",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Result type for fallible validation plumbing (cache I/O, token checks).
pub type ValidateResult<T> = Result<T, ValidationError>;

/// Errors from license validation.
///
/// Network failures trigger the offline fallback before surfacing; a
/// server rejection surfaces immediately and overrides any cache.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Offline fallback found no usable cached license.
    #[error("no cached license available for offline validation")]
    NoCachedLicense,

    /// The license authority was unreachable.
    #[error("license authority unreachable: {0}")]
    NetworkUnavailable(String),

    /// The authority explicitly rejected the license; server state wins
    /// over any cached token.
    #[error("license {0} by the authority")]
    ServerRejected(RejectionReason),

    /// The cached offline allowance has run out.
    #[error("offline grace period expired, reconnect to revalidate")]
    OfflineGraceExpired,

    /// Fingerprinting failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Token verification failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Cache store I/O failed.
    #[error("license cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache record could not be (de)serialized.
    #[error("license cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ValidationError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCachedLicense => codes::NO_CACHED_LICENSE,
            Self::NetworkUnavailable(_) => codes::NETWORK_UNAVAILABLE,
            Self::ServerRejected(reason) => reason.code(),
            Self::OfflineGraceExpired => codes::OFFLINE_GRACE_EXPIRED,
            Self::Identity(e) => e.code(),
            Self::Token(e) => e.code(),
            Self::Io(_) => codes::NO_CACHED_LICENSE,
            Self::Serialization(_) => codes::NO_CACHED_LICENSE,
        }
    }
}
