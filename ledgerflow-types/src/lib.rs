//! Core type definitions for LedgerFlow.
//!
//! This crate defines the fundamental types shared by the licensing and
//! job admission crates:
//! - License, token, and job identifiers (UUID newtypes)
//! - License tiers and their entitlement limits
//! - Job priorities and lifecycle states
//!
//! Domain-specific payloads (extracted documents, accounting entries)
//! belong to their producing subsystems, not here.

mod ids;
mod job;
mod tier;

pub use ids::{JobId, LicenseId, TokenId};
pub use job::{JobPriority, JobState};
pub use tier::LicenseTier;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown tier: {0}")]
    UnknownTier(String),
}
