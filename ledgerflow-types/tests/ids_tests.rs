use ledgerflow_types::{JobId, LicenseId, TokenId};
use std::collections::HashSet;
use std::str::FromStr;

// ── LicenseId ─────────────────────────────────────────────────────

#[test]
fn license_id_new_is_unique() {
    let a = LicenseId::new();
    let b = LicenseId::new();
    assert_ne!(a, b);
}

#[test]
fn license_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::new_v4();
    let id = LicenseId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn license_id_display_and_parse() {
    let id = LicenseId::new();
    let parsed = LicenseId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn license_id_parse_invalid() {
    assert!(LicenseId::parse("not-a-uuid").is_err());
}

#[test]
fn license_id_serde_transparent() {
    let id = LicenseId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let parsed: LicenseId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}

// ── TokenId ───────────────────────────────────────────────────────

#[test]
fn token_id_new_is_unique() {
    let a = TokenId::new();
    let b = TokenId::new();
    assert_ne!(a, b);
}

#[test]
fn token_id_from_str() {
    let id = TokenId::new();
    let parsed = TokenId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

// ── JobId ─────────────────────────────────────────────────────────

#[test]
fn job_id_new_is_unique() {
    let a = JobId::new();
    let b = JobId::new();
    assert_ne!(a, b);
}

#[test]
fn job_ids_are_time_ordered() {
    // UUID v7 embeds a millisecond timestamp, so ids created in sequence
    // compare in creation order (ties broken by random bits).
    let first = JobId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = JobId::new();
    assert!(first < second);
}

#[test]
fn job_id_hash_and_eq() {
    let id = JobId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn job_id_display_and_parse() {
    let id = JobId::new();
    let parsed = JobId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}
