//! License tiers and their entitlement limits.
//!
//! A tier determines three ceilings: how many jobs may process
//! concurrently, how many jobs a single batch submission may contain,
//! and how long a device may keep working on a cached license while
//! the authority is unreachable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The license tier (aligned with the license authority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    /// Trial (limited-time free access).
    Trial,
    /// Standard subscription.
    Standard,
    /// Professional subscription.
    Professional,
    /// Enterprise (site license, unbounded concurrency).
    Enterprise,
}

impl LicenseTier {
    /// Maximum number of concurrently processing jobs, or `None` for
    /// unbounded (Enterprise).
    #[must_use]
    pub fn concurrency_limit(&self) -> Option<u32> {
        match self {
            Self::Trial => Some(1),
            Self::Standard => Some(3),
            Self::Professional => Some(6),
            Self::Enterprise => None,
        }
    }

    /// Maximum number of jobs in a single batch submission.
    #[must_use]
    pub fn batch_limit(&self) -> u32 {
        match self {
            Self::Trial => 5,
            Self::Standard => 25,
            Self::Professional => 100,
            Self::Enterprise => 500,
        }
    }

    /// How long a cached license keeps working offline, in seconds.
    #[must_use]
    pub fn offline_allowance_secs(&self) -> i64 {
        match self {
            Self::Trial => 24 * 60 * 60,
            Self::Standard => 7 * 24 * 60 * 60,
            Self::Professional => 14 * 24 * 60 * 60,
            Self::Enterprise => 30 * 24 * 60 * 60,
        }
    }

    /// The feature set granted by default at this tier. The authority may
    /// extend this per license; it never shrinks below these.
    #[must_use]
    pub fn default_features(&self) -> BTreeSet<String> {
        let features: &[&str] = match self {
            Self::Trial => &["pdf-extract"],
            Self::Standard => &["pdf-extract", "ledger-export"],
            Self::Professional => &["pdf-extract", "ledger-export", "batch-import", "ocr-tables"],
            Self::Enterprise => &[
                "pdf-extract",
                "ledger-export",
                "batch-import",
                "ocr-tables",
                "api-access",
            ],
        };
        features.iter().map(|s| (*s).to_string()).collect()
    }

    /// Stable lowercase name, matching the serde representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Standard => "standard",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(Self::Trial),
            "standard" => Ok(Self::Standard),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(crate::Error::UnknownTier(other.to_string())),
        }
    }
}
