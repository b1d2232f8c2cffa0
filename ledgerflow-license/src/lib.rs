//! Device-bound licensing for LedgerFlow.
//!
//! This crate handles:
//! - Hardware fingerprinting for device binding
//! - Signed license tokens (keyed MAC, constant-time verification)
//! - Online validation against the license authority
//! - Offline fallback to a cached token, bounded by a tier-specific
//!   grace period state machine
//!
//! # Design Principles
//!
//! - **Offline-first**: a paying user keeps working while disconnected
//! - **Bounded offline use**: the grace allowance caps how long
//! - **Device binding**: tokens are bound to a hardware fingerprint and a
//!   cached token is trusted only while the fingerprint still matches
//! - **Server wins**: an explicit rejection from a reachable authority
//!   overrides any cached state immediately
//!
//! # Token Format
//!
//! Tokens are `base64url(header).base64url(payload).base64url(mac)` with
//! an HMAC-SHA256 MAC over the first two segments. See [`TokenService`].

mod authority;
mod cache;
mod error;
mod fingerprint;
mod grace;
mod token;
mod validator;

pub use authority::{AuthorityError, IssuedLicense, LicenseAuthority};
pub use cache::{CacheStore, CachedLicense};
pub use error::{
    codes, IdentityError, IdentityResult, RejectionReason, TokenError, TokenResult,
    ValidateResult, ValidationError,
};
pub use fingerprint::{
    DeviceFingerprint, FingerprintConfig, FingerprintService, HardwareIdentifiers,
};
pub use grace::{GraceConfig, GraceEvent, GraceLevel, GracePeriodManager};
pub use token::{LicenseToken, TokenClaims, TokenService, TOKEN_ALG, TOKEN_TYPE};
pub use validator::{LicenseValidator, ValidateOptions, ValidationResult, ValidationSource};

#[cfg(feature = "online")]
pub use authority::HttpAuthority;
