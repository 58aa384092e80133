//! Engine configuration.
//!
//! The values are fixed when the host builds the engine; nothing in this
//! crate mutates a [`ShieldConfig`] at runtime. [`ShieldConfig::builtin`]
//! carries the compiled-in deployment values, and tooling may load an
//! override from TOML.

use crate::error::{LicenseError, LicenseResult};
use crate::key::decode_public_key;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Compiled-in Ed25519 verifying key (DER SubjectPublicKeyInfo, base64).
/// The matching signing key is held by the license issuer.
pub const BUILTIN_PUBLIC_KEY: &str = "MCowBQYDK2VwAyEAmrloj8fxnJOlIqNVcSQ/u6fmoGeNVQSTugDZsZ6SJFE=";

/// Default trial length.
pub const DEFAULT_TRIAL_DAYS: u32 = 30;

/// Default offline grace window.
pub const DEFAULT_GRACE_HOURS: u32 = 72;

/// Default heartbeat interval (one hour).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 3600;

/// Default bound on a single heartbeat round trip.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 10;

/// Activation engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Application identifier reported to the heartbeat server.
    pub app_id: String,
    /// Human-readable application name.
    pub app_name: String,
    /// Trial length in days.
    pub trial_days: u32,
    /// Offline grace window in hours.
    pub grace_hours: u32,
    /// Minimum spacing between heartbeat calls.
    pub heartbeat_interval_secs: u64,
    /// Whether the heartbeat is consulted at all.
    pub heartbeat_enabled: bool,
    /// Heartbeat endpoint base URL.
    pub heartbeat_url: String,
    /// Upper bound on one heartbeat round trip.
    pub heartbeat_timeout_secs: u64,
    /// Embedded Ed25519 verifying key, base64 (raw 32 bytes or DER SPKI).
    pub public_key: String,
}

impl ShieldConfig {
    /// Returns the compiled-in deployment configuration.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            app_id: "com.icontrol.wda".to_string(),
            app_name: "iPhoneControl".to_string(),
            trial_days: DEFAULT_TRIAL_DAYS,
            grace_hours: DEFAULT_GRACE_HOURS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            heartbeat_enabled: false,
            heartbeat_url: String::new(),
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            public_key: BUILTIN_PUBLIC_KEY.to_string(),
        }
    }

    /// Parses a TOML document. Missing fields take their built-in values.
    pub fn from_toml_str(content: &str) -> LicenseResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| LicenseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> LicenseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks that the configuration can drive an engine.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.trial_days == 0 {
            return Err(LicenseError::Config("trial_days must be positive".into()));
        }
        if self.grace_hours == 0 {
            return Err(LicenseError::Config("grace_hours must be positive".into()));
        }
        if self.heartbeat_enabled {
            if self.heartbeat_url.trim().is_empty() {
                return Err(LicenseError::Config(
                    "heartbeat_enabled requires heartbeat_url".into(),
                ));
            }
            if self.heartbeat_timeout_secs == 0 {
                return Err(LicenseError::Config(
                    "heartbeat_timeout_secs must be positive".into(),
                ));
            }
        }
        decode_public_key(&self.public_key)?;
        Ok(())
    }

    /// Trial length as a duration.
    #[must_use]
    pub fn trial_length(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.trial_days))
    }

    /// Grace window as a duration.
    #[must_use]
    pub fn grace_length(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.grace_hours))
    }

    /// Heartbeat spacing as a duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> chrono::Duration {
        // chrono's millisecond representation bounds the second count
        let secs = i64::try_from(self.heartbeat_interval_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self::builtin()
    }
}
