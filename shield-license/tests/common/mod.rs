//! Shared test helpers for license tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use shield_license::{
    ActivationEngine, ActivationStatus, DeviceIdentity, HeartbeatClient, HeartbeatOutcome,
    LicensePayload, LicensePlan, LicenseSigner, MemoryStore, ShieldConfig,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Deterministic seed shared by every test signer.
pub const TEST_SEED: [u8; 32] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32,
];

/// The device id every [`FixedDevice`] reports.
pub const DEVICE: &str = "device-under-test";

/// Returns the deterministic test signer.
pub fn test_signer() -> LicenseSigner {
    LicenseSigner::from_seed(&TEST_SEED)
}

/// Raw base64 public key of [`test_signer`].
pub fn test_public_key() -> String {
    STANDARD.encode(test_signer().verifying_key().to_bytes())
}

/// Fixed evaluation start used across scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()
}

/// Builtin config with the test public key.
pub fn test_config() -> ShieldConfig {
    ShieldConfig {
        public_key: test_public_key(),
        ..ShieldConfig::builtin()
    }
}

/// Config with the heartbeat switched on.
pub fn heartbeat_config() -> ShieldConfig {
    ShieldConfig {
        heartbeat_enabled: true,
        heartbeat_url: "https://license.invalid".to_string(),
        ..test_config()
    }
}

/// Signs a key with the given plan, issue time and optional bound device.
pub fn make_key(plan: LicensePlan, iat: DateTime<Utc>, device: Option<&str>) -> String {
    test_signer()
        .sign(&LicensePayload {
            sub: Some("customer-42".to_string()),
            device_id: device.map(str::to_string),
            plan,
            iat: iat.timestamp(),
            exp: None,
        })
        .unwrap()
}

/// Signs a perpetual key bound to [`DEVICE`].
pub fn perpetual_key() -> String {
    make_key(LicensePlan::Perpetual, t0(), Some(DEVICE))
}

/// Signs a key with an explicit term end.
pub fn key_until(exp: DateTime<Utc>, device: Option<&str>) -> String {
    test_signer()
        .sign(&LicensePayload {
            sub: None,
            device_id: device.map(str::to_string),
            plan: LicensePlan::Annual,
            iat: t0().timestamp(),
            exp: Some(exp.timestamp()),
        })
        .unwrap()
}

/// Device identity that always reports the same id.
pub struct FixedDevice(pub String);

impl DeviceIdentity for FixedDevice {
    fn device_id(&self) -> String {
        self.0.clone()
    }
}

/// Heartbeat double that replays queued outcomes, then a default.
pub struct ScriptedHeartbeat {
    outcomes: Mutex<VecDeque<HeartbeatOutcome>>,
    fallback: HeartbeatOutcome,
    calls: Mutex<Vec<(String, ActivationStatus)>>,
}

impl ScriptedHeartbeat {
    pub fn always(outcome: HeartbeatOutcome) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: HeartbeatOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<(String, ActivationStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

impl HeartbeatClient for ScriptedHeartbeat {
    fn report(&self, device_id: &str, status: ActivationStatus) -> HeartbeatOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((device_id.to_string(), status));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Engine over a fresh memory store, heartbeat disabled.
pub fn engine() -> (ActivationEngine, Arc<MemoryStore>) {
    engine_with(test_config(), None)
}

/// Engine over a fresh memory store with the given config and heartbeat.
pub fn engine_with(
    config: ShieldConfig,
    heartbeat: Option<Arc<ScriptedHeartbeat>>,
) -> (ActivationEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let mut builder = ActivationEngine::builder(config, store.clone())
        .device_identity(Arc::new(FixedDevice(DEVICE.to_string())));
    if let Some(hb) = heartbeat {
        builder = builder.heartbeat(hb);
    }
    (builder.build().unwrap(), store)
}

/// Loads the persisted record straight from the store.
pub fn stored_record(store: &Arc<MemoryStore>) -> shield_license::ActivationRecord {
    shield_license::RecordStore::new(store.clone()).load().unwrap()
}
