//! License token creation and verification.
//!
//! Tokens are three base64url segments: `header.payload.mac`. The header
//! is `{"alg":"HS256","typ":"LFT"}`; the MAC is HMAC-SHA256 over
//! `header_b64.payload_b64` keyed with the service secret. MAC comparison
//! is constant-time, and no claim is trusted before the MAC verifies.

use crate::error::{TokenError, TokenResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use ledgerflow_types::{LicenseId, LicenseTier, TokenId};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeSet;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Token type tag carried in the header.
pub const TOKEN_TYPE: &str = "LFT";

/// MAC algorithm tag carried in the header.
pub const TOKEN_ALG: &str = "HS256";

/// Token header segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn new() -> Self {
        Self {
            alg: TOKEN_ALG.to_string(),
            typ: TOKEN_TYPE.to_string(),
        }
    }
}

/// Claims asserted by the license authority inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuing authority.
    pub iss: String,
    /// The license this token attests.
    pub sub: LicenseId,
    /// Fingerprint hash of the device the license is bound to.
    pub aud: String,
    /// License tier at issue time.
    pub tier: LicenseTier,
    /// Named capabilities granted by this license.
    pub features: BTreeSet<String>,
    /// Issued-at (seconds since epoch).
    pub iat: i64,
    /// Expires-at (seconds since epoch).
    pub exp: i64,
    /// Not-before (seconds since epoch).
    pub nbf: i64,
    /// Unique token ID for replay and audit tracking.
    pub jti: TokenId,
}

impl TokenClaims {
    /// Expiry as a UTC timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }

    /// Not-before as a UTC timestamp.
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.nbf, 0).single().unwrap_or_default()
    }

    /// Strict membership check against the granted feature set.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains(name)
    }
}

/// A license token: the raw encoded string plus its verified claims.
///
/// Immutable once issued; only a fresh `create` produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseToken {
    raw: String,
    claims: TokenClaims,
}

impl LicenseToken {
    /// The encoded `header.payload.mac` string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The claims this token carries.
    #[must_use]
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }
}

/// Creates and verifies license tokens with a keyed MAC.
pub struct TokenService {
    secret: Vec<u8>,
    issuer: String,
}

impl TokenService {
    /// Creates a token service with the given MAC secret and issuer name.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
        }
    }

    /// Creates a signed token binding `license` to `fingerprint_hash` for
    /// `validity` from now.
    #[must_use]
    pub fn create(
        &self,
        license: LicenseId,
        tier: LicenseTier,
        features: BTreeSet<String>,
        fingerprint_hash: &str,
        validity: Duration,
    ) -> LicenseToken {
        self.create_at(license, tier, features, fingerprint_hash, validity, Utc::now())
    }

    /// Creates a signed token with an explicit issue time.
    #[must_use]
    pub fn create_at(
        &self,
        license: LicenseId,
        tier: LicenseTier,
        features: BTreeSet<String>,
        fingerprint_hash: &str,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> LicenseToken {
        let iat = now.timestamp();
        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: license,
            aud: fingerprint_hash.to_string(),
            tier,
            features,
            iat,
            exp: iat + validity.num_seconds(),
            nbf: iat,
            jti: TokenId::new(),
        };

        let header_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenHeader::new()).expect("header serializes"),
        );
        let payload_b64 =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims serialize"));
        let mac = self.mac(&header_b64, &payload_b64);
        let mac_b64 = URL_SAFE_NO_PAD.encode(mac);

        LicenseToken {
            raw: format!("{header_b64}.{payload_b64}.{mac_b64}"),
            claims,
        }
    }

    /// Verifies a raw token against the expected device fingerprint hash
    /// and returns its claims.
    ///
    /// # Errors
    ///
    /// `Malformed` for structural problems, `InvalidSignature` when the MAC
    /// does not verify, `Expired`/`NotYetValid` for window violations, and
    /// `AudienceMismatch` when the token is bound to another device.
    pub fn verify(&self, raw: &str, expected_fingerprint_hash: &str) -> TokenResult<TokenClaims> {
        self.verify_at(raw, expected_fingerprint_hash, Utc::now())
    }

    /// Verifies a raw token at an explicit point in time.
    pub fn verify_at(
        &self,
        raw: &str,
        expected_fingerprint_hash: &str,
        now: DateTime<Utc>,
    ) -> TokenResult<TokenClaims> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::Malformed(
                "token must have exactly three segments".to_string(),
            ));
        }
        let (header_b64, payload_b64, mac_b64) = (parts[0], parts[1], parts[2]);

        let presented_mac = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|e| TokenError::Malformed(format!("invalid mac base64: {e}")))?;

        // MAC first: claims are untrusted bytes until it verifies.
        let expected_mac = self.mac(header_b64, payload_b64);
        if !bool::from(expected_mac.ct_eq(&presented_mac)) {
            return Err(TokenError::InvalidSignature);
        }

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| TokenError::Malformed(format!("invalid header base64: {e}")))?;
        let header: TokenHeader = serde_json::from_slice(&header_json)
            .map_err(|e| TokenError::Malformed(format!("invalid header JSON: {e}")))?;
        if header.alg != TOKEN_ALG || header.typ != TOKEN_TYPE {
            return Err(TokenError::Malformed(format!(
                "unsupported token header {}/{}",
                header.alg, header.typ
            )));
        }

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| TokenError::Malformed(format!("invalid payload base64: {e}")))?;
        let claims: TokenClaims = serde_json::from_slice(&payload_json)
            .map_err(|e| TokenError::Malformed(format!("invalid claims JSON: {e}")))?;

        if now.timestamp() < claims.nbf {
            return Err(TokenError::NotYetValid(claims.not_before()));
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired(claims.expires_at()));
        }
        if claims.aud != expected_fingerprint_hash {
            return Err(TokenError::AudienceMismatch);
        }

        Ok(claims)
    }

    fn mac(&self, header_b64: &str, payload_b64: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}
