//! Local license and activation enforcement for Shield.
//!
//! This crate decides, on every launch and periodically afterwards, whether
//! the host application may run and under which licensing state:
//! - Activation state machine (not activated, trial, licensed, grace,
//!   expired, revoked)
//! - License key validation via Ed25519 signature verification
//! - Anti-rollback checking of the device clock
//! - Persistence through a sealed secure store
//! - Optional server heartbeat with an offline grace window
//!
//! # Design Principles
//!
//! - **Fail closed**: storage failure is an error and the host must deny
//! - **Offline-first**: with the heartbeat disabled nothing leaves the device
//! - **Device binding**: keys carrying a device id only work on that device
//! - **Explicit startup**: no work happens until the host builds an engine
//!
//! # License Key Format
//!
//! Keys are formatted as: `base64url(payload).base64url(signature)`
//! The payload is a JSON object signed with Ed25519, containing the plan,
//! issued-at time, optional term end, and optional bound device id.
//!
//! # Limits
//!
//! Signature checks, sealed storage and rollback detection raise the cost of
//! bypassing the license. They do not stop a privileged attacker on the
//! device who patches the binary, extracts the store secret, or rewrites the
//! embedded public key. Deleting the whole store directory, or putting back
//! an older copy of it, is also not detected: the sealed file authenticates
//! its contents, not its age.

mod config;
mod device;
mod engine;
mod error;
mod heartbeat;
mod key;
mod record;
pub mod store;
mod time;

pub use config::{
    ShieldConfig, BUILTIN_PUBLIC_KEY, DEFAULT_GRACE_HOURS, DEFAULT_HEARTBEAT_INTERVAL_SECS,
    DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_TRIAL_DAYS,
};
pub use device::{fingerprint_of, DeviceIdentity, DeviceInfo, HardwareFingerprint, RandomDeviceId};
pub use engine::{ActivationEngine, Decision, DecisionReason, EngineBuilder, KeyVerdict, LicenseInfo};
pub use error::{LicenseError, LicenseResult};
pub use heartbeat::{DisabledHeartbeat, HeartbeatClient, HeartbeatOutcome};
pub use key::{
    decode_public_key, key_digest, verify, LicenseKey, LicensePayload, LicensePlan,
    LicenseSigner, SignatureVerifier, Verification, MAX_KEY_LEN,
};
pub use record::{ActivationRecord, ActivationStatus, MAX_RETIRED_KEYS};
pub use store::{
    EncryptedFileStore, MemoryStore, RecordStore, SecureStore, StoreError, StoreKey, StoreWrite,
};
pub use time::{
    Clock, ClockAnomaly, ManualClock, SystemClock, TimeCheck, TimeIntegrityMonitor,
    MAX_FORWARD_JUMP_SECS, ROLLBACK_TOLERANCE_SECS,
};

#[cfg(feature = "online")]
pub use heartbeat::HttpHeartbeat;
