//! Where the installation's device id comes from.
//!
//! The engine asks a [`DeviceIdentity`] exactly once, when the activation
//! record has no id yet. After that the stored id is authoritative: license
//! keys are bound to it, and a hardware change never silently rebinds them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env::consts;

/// Source of a fresh device identifier.
pub trait DeviceIdentity: Send + Sync {
    fn device_id(&self) -> String;
}

/// Platform facts included in diagnostics output. Not used for binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub os_name: String,
    pub os_version: String,
    pub hostname: String,
    pub arch: String,
}

impl DeviceInfo {
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: consts::OS.to_string(),
            os_version: platform::os_version().unwrap_or_else(unknown),
            hostname: platform::hostname().unwrap_or_else(unknown),
            arch: consts::ARCH.to_string(),
        }
    }
}

/// Id derived from what the machine says about itself.
///
/// The same machine yields the same id after the host application is
/// reinstalled and its store wiped, so deleting the store does not buy a
/// second trial under a new id.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareFingerprint;

impl HardwareFingerprint {
    #[must_use]
    pub fn compute() -> String {
        fingerprint_of(&Self::components())
    }

    /// Ordered inputs to the fingerprint. Missing sources are skipped.
    fn components() -> Vec<String> {
        [
            Some(consts::OS.to_string()),
            Some(consts::ARCH.to_string()),
            Some(platform::hostname().unwrap_or_else(unknown)),
            platform::machine_id(),
            std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .ok(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl DeviceIdentity for HardwareFingerprint {
    fn device_id(&self) -> String {
        Self::compute()
    }
}

/// A uuid v4, for platforms that expose nothing stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomDeviceId;

impl DeviceIdentity for RandomDeviceId {
    fn device_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// 22-character base64url id: the first 16 bytes of SHA-256 over the
/// `|`-joined components.
#[must_use]
pub fn fingerprint_of(components: &[String]) -> String {
    let digest = Sha256::digest(components.join("|").as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

fn unknown() -> String {
    "unknown".to_string()
}

mod platform {
    pub(super) fn hostname() -> Option<String> {
        hostname::get().ok()?.into_string().ok()
    }

    #[cfg(target_os = "linux")]
    pub(super) fn machine_id() -> Option<String> {
        ["/etc/machine-id", "/var/lib/dbus/machine-id"]
            .iter()
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .map(|text| text.trim().to_string())
            .find(|id| !id.is_empty())
    }

    #[cfg(target_os = "linux")]
    pub(super) fn os_version() -> Option<String> {
        let release = std::fs::read_to_string("/etc/os-release").ok()?;
        release
            .lines()
            .find_map(|line| line.strip_prefix("VERSION_ID="))
            .map(|v| v.trim_matches('"').to_string())
    }

    #[cfg(target_os = "macos")]
    pub(super) fn machine_id() -> Option<String> {
        let out = command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])?;
        // "IOPlatformUUID" = "XXXXXXXX-...."
        out.lines()
            .find(|line| line.contains("IOPlatformUUID"))
            .and_then(|line| line.split('"').nth(3))
            .map(str::to_string)
    }

    #[cfg(target_os = "macos")]
    pub(super) fn os_version() -> Option<String> {
        command_output("sw_vers", &["-productVersion"]).map(|v| v.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    fn command_output(program: &str, args: &[&str]) -> Option<String> {
        let output = std::process::Command::new(program).args(args).output().ok()?;
        String::from_utf8(output.stdout).ok()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    pub(super) fn machine_id() -> Option<String> {
        None
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    pub(super) fn os_version() -> Option<String> {
        None
    }
}
