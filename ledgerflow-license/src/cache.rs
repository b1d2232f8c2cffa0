//! Persisted validation cache.
//!
//! One JSON record per device: the last issued token, the fingerprint hash
//! it was bound to, and when the last successful online validation
//! happened. This is the only licensing state that survives a restart.

use crate::error::ValidateResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The cached license record for this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLicense {
    /// The raw token issued by the last successful online validation.
    pub token: String,
    /// Fingerprint hash the token was bound to when cached.
    pub fingerprint_hash: String,
    /// Timestamp of the last successful online validation.
    pub last_online_validation_at: DateTime<Utc>,
}

/// File-backed store for the cached license record.
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Opens the store at the platform data directory
    /// (`<data_dir>/ledgerflow/license-cache.json`).
    pub fn open_default() -> ValidateResult<Self> {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::with_path(
            base.join("ledgerflow").join("license-cache.json"),
        ))
    }

    /// Opens the store at an explicit path (used by tests).
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cached record, or `None` if nothing has been cached yet.
    pub fn load(&self) -> ValidateResult<Option<CachedLicense>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let record: CachedLicense = serde_json::from_str(&json)?;
        Ok(Some(record))
    }

    /// Persists the record, replacing any previous one. Writes to a
    /// sibling temp file first so a crash never leaves a half-written
    /// record.
    pub fn store(&self, record: &CachedLicense) -> ValidateResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Discards the cached record (logout/deactivation).
    pub fn clear(&self) -> ValidateResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
