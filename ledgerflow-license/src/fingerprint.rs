//! Device fingerprinting for license binding.
//!
//! Derives a stable hardware fingerprint from the identifiers available on
//! this device, in a fixed priority order:
//!
//! 1. OS-reported hardware UUID
//! 2. OS machine identifier
//! 3. Primary physical network adapter address
//! 4. Storage serial
//! 5. Firmware serial
//!
//! Adapters whose address carries a virtualization-vendor prefix are
//! excluded, so the fingerprint never binds to a hypervisor-assigned MAC
//! that is unstable or shared across VMs.

use crate::error::{IdentityError, IdentityResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// MAC prefixes assigned to virtualization vendors (VMware, VirtualBox,
/// Hyper-V, QEMU/KVM, Xen).
const VM_MAC_PREFIXES: &[&str] = [
    "00:05:69", "00:0c:29", "00:1c:14", "00:50:56", "08:00:27", "00:15:5d", "52:54:00",
    "00:16:3e",
]
.as_slice();

/// Score weight per identifier class, normalized so all classes sum to 100.
const WEIGHT_MACHINE_UUID: u8 = 40;
const WEIGHT_MACHINE_ID: u8 = 25;
const WEIGHT_MAC_ADDRESS: u8 = 15;
const WEIGHT_STORAGE_SERIAL: u8 = 10;
const WEIGHT_FIRMWARE_SERIAL: u8 = 10;

/// Raw hardware identifiers collected from the platform.
///
/// All fields are optional; fingerprinting fails only when every class is
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareIdentifiers {
    /// OS-reported hardware UUID (DMI product UUID, IOPlatformUUID).
    pub machine_uuid: Option<String>,
    /// OS machine identifier (`/etc/machine-id` and equivalents).
    pub machine_id: Option<String>,
    /// Primary physical network adapter address.
    pub mac_address: Option<String>,
    /// Serial number of the first storage device.
    pub storage_serial: Option<String>,
    /// Firmware/board serial number.
    pub firmware_serial: Option<String>,
}

impl HardwareIdentifiers {
    /// Collects identifiers from the current platform.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            machine_uuid: get_machine_uuid(),
            machine_id: get_machine_id(),
            mac_address: get_physical_mac(),
            storage_serial: get_storage_serial(),
            firmware_serial: get_firmware_serial(),
        }
    }

    /// Returns true if no identifier class is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machine_uuid.is_none()
            && self.machine_id.is_none()
            && self.mac_address.is_none()
            && self.storage_serial.is_none()
            && self.firmware_serial.is_none()
    }

    /// Identifier classes in priority order as `(class, value, weight)`.
    fn classes(&self) -> [(&'static str, Option<&str>, u8); 5] {
        [
            ("machine-uuid", self.machine_uuid.as_deref(), WEIGHT_MACHINE_UUID),
            ("machine-id", self.machine_id.as_deref(), WEIGHT_MACHINE_ID),
            ("mac", self.mac_address.as_deref(), WEIGHT_MAC_ADDRESS),
            ("storage", self.storage_serial.as_deref(), WEIGHT_STORAGE_SERIAL),
            ("firmware", self.firmware_serial.as_deref(), WEIGHT_FIRMWARE_SERIAL),
        ]
    }
}

/// A stable fingerprint that identifies this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    /// Highest-priority identifier that was present.
    primary_id: Option<String>,
    /// Remaining identifiers, in priority order.
    fallback_ids: Vec<String>,
    /// Hex-encoded SHA-256 over the ordered identifier classes.
    combined_hash: String,
    /// 0–100, weighted by which identifier classes were present.
    strength_score: u8,
    /// When the fingerprint was generated.
    generated_at: DateTime<Utc>,
}

impl DeviceFingerprint {
    /// Derives a fingerprint from a set of collected identifiers.
    ///
    /// Deterministic: the same identifiers always produce the same
    /// `combined_hash`, regardless of when or where they were collected.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InsufficientIdentifiers`] if no identifier
    /// class is present.
    pub fn from_identifiers(ids: &HardwareIdentifiers) -> IdentityResult<Self> {
        if ids.is_empty() {
            return Err(IdentityError::InsufficientIdentifiers);
        }

        let mut hasher = Sha256::new();
        let mut score: u32 = 0;
        let mut present: Vec<String> = Vec::new();

        for (class, value, weight) in ids.classes() {
            if let Some(value) = value {
                // Class tag keeps the hash input unambiguous when a class
                // is missing.
                hasher.update(class.as_bytes());
                hasher.update(b":");
                hasher.update(value.as_bytes());
                hasher.update(b"|");
                score += u32::from(weight);
                present.push(value.to_string());
            }
        }

        let combined_hash = hex::encode(hasher.finalize());
        let mut iter = present.into_iter();
        let primary_id = iter.next();
        let fallback_ids: Vec<String> = iter.collect();

        Ok(Self {
            primary_id,
            fallback_ids,
            combined_hash,
            strength_score: score.min(100) as u8,
            generated_at: Utc::now(),
        })
    }

    /// Generates a fingerprint for the current device.
    pub fn generate() -> IdentityResult<Self> {
        Self::from_identifiers(&HardwareIdentifiers::collect())
    }

    /// The combined hash binding this device to a license token audience.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.combined_hash
    }

    /// Highest-priority identifier that was present.
    #[must_use]
    pub fn primary_id(&self) -> Option<&str> {
        self.primary_id.as_deref()
    }

    /// Remaining identifiers, in priority order.
    #[must_use]
    pub fn fallback_ids(&self) -> &[String] {
        &self.fallback_ids
    }

    /// How much hardware evidence backs this fingerprint (0–100).
    #[must_use]
    pub fn strength_score(&self) -> u8 {
        self.strength_score
    }

    /// When the fingerprint was generated.
    #[must_use]
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

/// Configuration for the fingerprint service.
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    /// How long a generated fingerprint stays cached in-process.
    pub cache_ttl: Duration,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Generates device fingerprints with an in-process TTL cache.
///
/// Hardware probes hit the filesystem and external tools, so results are
/// cached for [`FingerprintConfig::cache_ttl`]; `refresh()` bypasses the
/// cache.
pub struct FingerprintService {
    config: FingerprintConfig,
    cached: Mutex<Option<(DeviceFingerprint, Instant)>>,
}

impl FingerprintService {
    /// Creates a service with the default 1-hour cache TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FingerprintConfig::default())
    }

    /// Creates a service with a custom configuration.
    #[must_use]
    pub fn with_config(config: FingerprintConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    /// Returns the device fingerprint, generating it on first use or after
    /// the cache TTL elapses.
    pub fn generate(&self) -> IdentityResult<DeviceFingerprint> {
        let mut cached = self.cached.lock().expect("fingerprint cache poisoned");
        if let Some((fingerprint, at)) = cached.as_ref() {
            if at.elapsed() < self.config.cache_ttl {
                return Ok(fingerprint.clone());
            }
        }
        let fingerprint = DeviceFingerprint::generate()?;
        *cached = Some((fingerprint.clone(), Instant::now()));
        Ok(fingerprint)
    }

    /// Regenerates the fingerprint, bypassing the cache.
    pub fn refresh(&self) -> IdentityResult<DeviceFingerprint> {
        let fingerprint = DeviceFingerprint::generate()?;
        let mut cached = self.cached.lock().expect("fingerprint cache poisoned");
        *cached = Some((fingerprint.clone(), Instant::now()));
        Ok(fingerprint)
    }
}

impl Default for FingerprintService {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if the MAC belongs to a known virtualization vendor range.
fn is_virtual_mac(mac: &str) -> bool {
    let normalized = mac.to_ascii_lowercase();
    VM_MAC_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
}

/// Gets the OS-reported hardware UUID.
fn get_machine_uuid() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        read_trimmed("/sys/class/dmi/id/product_uuid")
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

/// Gets the OS machine identifier.
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        read_trimmed("/etc/machine-id").or_else(|| read_trimmed("/var/lib/dbus/machine-id"))
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Gets the address of the first physical (non-virtual) network adapter.
fn get_physical_mac() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let entries = std::fs::read_dir("/sys/class/net").ok()?;
        for entry in entries.flatten() {
            let iface = entry.file_name();
            let iface = iface.to_string_lossy();
            if iface == "lo" {
                continue;
            }
            let addr_path = format!("/sys/class/net/{iface}/address");
            if let Some(addr) = read_trimmed(&addr_path) {
                if addr.is_empty() || addr == "00:00:00:00:00:00" || is_virtual_mac(&addr) {
                    continue;
                }
                return Some(addr);
            }
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Gets the serial of the first fixed storage device.
fn get_storage_serial() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let entries = std::fs::read_dir("/sys/block").ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy().to_string();
            if name.starts_with("loop") || name.starts_with("ram") || name.starts_with("zram") {
                continue;
            }
            if let Some(serial) = read_trimmed(&format!("/sys/block/{name}/device/serial")) {
                if !serial.is_empty() {
                    return Some(serial);
                }
            }
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Gets the firmware/board serial number.
fn get_firmware_serial() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        read_trimmed("/sys/class/dmi/id/board_serial")
            .or_else(|| read_trimmed("/sys/class/dmi/id/product_serial"))
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformSerialNumber"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

#[cfg(target_os = "linux")]
fn read_trimmed(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
