//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ledgerflow_license::{
    AuthorityError, DeviceFingerprint, HardwareIdentifiers, IssuedLicense, LicenseAuthority,
    TokenService,
};
use ledgerflow_types::{LicenseId, LicenseTier};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Deterministic MAC secret shared by every test token service.
pub const TEST_SECRET: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

/// Issuer name used across tests.
pub const TEST_ISSUER: &str = "authority.test";

pub fn token_service() -> TokenService {
    TokenService::new(*TEST_SECRET, TEST_ISSUER)
}

/// Fingerprint for "device A" built from a full, fixed identifier set.
pub fn fingerprint_a() -> DeviceFingerprint {
    DeviceFingerprint::from_identifiers(&HardwareIdentifiers {
        machine_uuid: Some("4c4c4544-0042-3510-8044-b9c04f313233".into()),
        machine_id: Some("9f2e6c1a8d3b4e5f".into()),
        mac_address: Some("3c:7c:3f:1a:2b:3c".into()),
        storage_serial: Some("S4EVNX0N123456".into()),
        firmware_serial: Some("BSN12345678".into()),
    })
    .unwrap()
}

/// Fingerprint for a different physical device.
pub fn fingerprint_b() -> DeviceFingerprint {
    DeviceFingerprint::from_identifiers(&HardwareIdentifiers {
        machine_uuid: Some("11111111-2222-3333-4444-555555555555".into()),
        machine_id: Some("0a0a0a0a0a0a0a0a".into()),
        mac_address: Some("a4:5e:60:aa:bb:cc".into()),
        storage_serial: None,
        firmware_serial: None,
    })
    .unwrap()
}

/// Issues a raw signed token string for the given device at `now`.
pub fn issue_raw_token(
    svc: &TokenService,
    fingerprint: &DeviceFingerprint,
    tier: LicenseTier,
    validity: Duration,
    now: DateTime<Utc>,
) -> String {
    svc.create_at(
        LicenseId::new(),
        tier,
        tier.default_features(),
        fingerprint.hash(),
        validity,
        now,
    )
    .raw()
    .to_string()
}

/// An authority that replays a scripted sequence of responses, then keeps
/// returning `Unreachable` once the script runs out.
pub struct ScriptedAuthority {
    script: Mutex<VecDeque<Result<IssuedLicense, AuthorityError>>>,
}

impl ScriptedAuthority {
    pub fn new(responses: Vec<Result<IssuedLicense, AuthorityError>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
        }
    }

    /// An authority that is never reachable.
    pub fn unreachable() -> Self {
        Self::new(Vec::new())
    }

    pub fn issued(token: String) -> Result<IssuedLicense, AuthorityError> {
        Ok(IssuedLicense {
            token,
            message: None,
        })
    }
}

#[async_trait]
impl LicenseAuthority for ScriptedAuthority {
    async fn issue(
        &self,
        _license_key: &str,
        _fingerprint_hash: &str,
    ) -> Result<IssuedLicense, AuthorityError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthorityError::Unreachable("no route to host".into())))
    }
}
