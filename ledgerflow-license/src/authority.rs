//! Remote license authority seam.
//!
//! The validator talks to the authority through the [`LicenseAuthority`]
//! trait so tests can substitute scripted authorities. An unreachable
//! authority is a recoverable condition (it triggers the offline fallback);
//! an explicit rejection is not.

use crate::error::RejectionReason;
use async_trait::async_trait;
use thiserror::Error;

/// A fresh license issued by the authority.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IssuedLicense {
    /// Signed token reflecting current status and entitlements.
    pub token: String,
    /// Optional operator-facing note from the authority.
    pub message: Option<String>,
}

/// Errors from talking to the license authority.
#[derive(Debug, Clone, Error)]
pub enum AuthorityError {
    /// Network or timeout failure; validation falls back to the cache.
    #[error("authority unreachable: {0}")]
    Unreachable(String),

    /// The authority answered and rejected the license. Reachability
    /// implies authority: this overrides any cached token.
    #[error("authority rejected license: {0}")]
    Rejected(RejectionReason),

    /// The authority answered with something we could not parse.
    #[error("malformed authority response: {0}")]
    Malformed(String),
}

/// A remote authority that can issue device-bound license tokens.
#[async_trait]
pub trait LicenseAuthority: Send + Sync {
    /// Validates `license_key` for the device identified by
    /// `fingerprint_hash` and issues a fresh token on success.
    async fn issue(
        &self,
        license_key: &str,
        fingerprint_hash: &str,
    ) -> Result<IssuedLicense, AuthorityError>;
}

#[cfg(feature = "online")]
pub use http::HttpAuthority;

#[cfg(feature = "online")]
mod http {
    use super::{AuthorityError, IssuedLicense, LicenseAuthority};
    use crate::error::RejectionReason;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    /// Validation request sent to the authority.
    #[derive(Debug, Serialize)]
    struct ValidateRequest<'a> {
        license_key: &'a str,
        fingerprint_hash: &'a str,
    }

    /// Validation response from the authority.
    #[derive(Debug, Deserialize)]
    struct ValidateResponse {
        status: String,
        token: Option<String>,
        message: Option<String>,
    }

    /// HTTP client for the license authority.
    pub struct HttpAuthority {
        client: reqwest::Client,
        base_url: String,
    }

    impl HttpAuthority {
        /// Creates a client for the authority at `base_url` with a 10s
        /// request timeout.
        pub fn new(base_url: impl Into<String>) -> Result<Self, AuthorityError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| AuthorityError::Unreachable(e.to_string()))?;
            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            })
        }
    }

    #[async_trait]
    impl LicenseAuthority for HttpAuthority {
        async fn issue(
            &self,
            license_key: &str,
            fingerprint_hash: &str,
        ) -> Result<IssuedLicense, AuthorityError> {
            let url = format!("{}/api/v1/licenses/validate", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(&ValidateRequest {
                    license_key,
                    fingerprint_hash,
                })
                .send()
                .await
                .map_err(|e| AuthorityError::Unreachable(e.to_string()))?;

            if response.status().is_server_error() {
                return Err(AuthorityError::Unreachable(format!(
                    "authority returned {}",
                    response.status()
                )));
            }

            let body: ValidateResponse = response
                .json()
                .await
                .map_err(|e| AuthorityError::Malformed(e.to_string()))?;

            match body.status.as_str() {
                "active" => {
                    let token = body.token.ok_or_else(|| {
                        AuthorityError::Malformed("active response without token".to_string())
                    })?;
                    Ok(IssuedLicense {
                        token,
                        message: body.message,
                    })
                }
                "revoked" => Err(AuthorityError::Rejected(RejectionReason::Revoked)),
                "suspended" => Err(AuthorityError::Rejected(RejectionReason::Suspended)),
                "expired" => Err(AuthorityError::Rejected(RejectionReason::Expired)),
                other => Err(AuthorityError::Malformed(format!(
                    "unknown license status: {other}"
                ))),
            }
        }
    }
}
