//! Command implementations for the `shield` tool.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use shield_license::{
    ActivationEngine, Decision, DeviceInfo, EncryptedFileStore, HeartbeatClient, KeyVerdict,
    LicenseInfo, LicensePayload, LicensePlan, LicenseSigner, ShieldConfig,
};
use std::path::Path;
use std::sync::Arc;

/// Loads the config file, or the compiled-in values when none is given.
pub fn load_config(path: Option<&Path>) -> Result<ShieldConfig> {
    match path {
        Some(path) => ShieldConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ShieldConfig::builtin()),
    }
}

/// Builds an engine over the encrypted store in `store_dir`.
pub fn open_engine(config: ShieldConfig, store_dir: &Path, secret: &str) -> Result<ActivationEngine> {
    let store = EncryptedFileStore::open(store_dir, secret)
        .with_context(|| format!("opening store in {}", store_dir.display()))?;
    let mut builder = ActivationEngine::builder(config.clone(), Arc::new(store));
    if let Some(heartbeat) = heartbeat_for(&config)? {
        builder = builder.heartbeat(heartbeat);
    }
    builder.build().context("building activation engine")
}

#[cfg(feature = "online")]
fn heartbeat_for(config: &ShieldConfig) -> Result<Option<Arc<dyn HeartbeatClient>>> {
    if !config.heartbeat_enabled {
        return Ok(None);
    }
    let client = shield_license::HttpHeartbeat::from_config(config)?;
    Ok(Some(Arc::new(client)))
}

#[cfg(not(feature = "online"))]
fn heartbeat_for(config: &ShieldConfig) -> Result<Option<Arc<dyn HeartbeatClient>>> {
    if config.heartbeat_enabled {
        tracing::warn!("heartbeat enabled but built without the online feature");
    }
    Ok(None)
}

/// Human-readable summary of a decision.
pub fn describe_decision(decision: &Decision) -> String {
    let mut out = format!(
        "status:    {}\nallowed:   {}\nreason:    {:?}",
        decision.status, decision.allowed, decision.reason
    );
    if let Some(remaining) = decision.remaining {
        out.push_str(&format!("\nremaining: {}", format_remaining(remaining)));
    }
    match &decision.key {
        Some(KeyVerdict::Accepted { plan, expires_at }) => {
            let until = expires_at.map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            out.push_str(&format!("\nkey:       accepted ({plan:?}, expires {until})"));
        }
        Some(KeyVerdict::Rejected { reason }) => {
            out.push_str(&format!("\nkey:       rejected: {reason}"));
        }
        None => {}
    }
    out
}

fn format_remaining(remaining: Duration) -> String {
    let days = remaining.num_days();
    let hours = remaining.num_hours() - days * 24;
    if days > 0 {
        format!("{days}d {hours}h")
    } else {
        format!("{hours}h {}m", remaining.num_minutes() - remaining.num_hours() * 60)
    }
}

/// Output of the `info` command.
#[derive(Debug, Serialize)]
pub struct InfoReport {
    #[serde(flatten)]
    pub license: LicenseInfo,
    pub device: DeviceInfo,
}

/// Collects the `info` report.
pub fn info_report(engine: &ActivationEngine) -> Result<InfoReport> {
    Ok(InfoReport {
        license: engine.info()?,
        device: DeviceInfo::collect(),
    })
}

/// A freshly generated issuer key pair.
#[derive(Debug, Serialize)]
pub struct KeyPair {
    /// Base64 signing seed. Keep secret.
    pub signing_key: String,
    /// Base64 verifying key for `public_key` in the config.
    pub public_key: String,
}

/// Generates an issuer key pair.
pub fn keygen() -> KeyPair {
    let signer = LicenseSigner::generate();
    KeyPair {
        signing_key: signer.seed_base64(),
        public_key: signer.public_key_base64(),
    }
}

/// Issues a license key.
///
/// `days` sets an explicit term from `now`; otherwise the plan's own length
/// applies.
pub fn sign_license(
    signing_key_b64: &str,
    device: Option<&str>,
    plan: &str,
    days: Option<u32>,
    subject: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String> {
    let Some(plan) = LicensePlan::from_name(plan) else {
        bail!("unknown plan '{plan}' (expected trial, monthly, annual or perpetual)");
    };
    let signer = LicenseSigner::from_base64(signing_key_b64).context("reading signing key")?;
    let exp = days.map(|d| now.timestamp() + i64::from(d) * 24 * 60 * 60);
    let payload = LicensePayload {
        sub: subject.map(str::to_string),
        device_id: device.map(str::to_string),
        plan,
        iat: now.timestamp(),
        exp,
    };
    Ok(signer.sign(&payload)?)
}
