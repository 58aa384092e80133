//! The activation state machine.
//!
//! One call to [`ActivationEngine::evaluate`] is one transition: load the
//! record, check the clock against the stored anchor, consider a presented
//! key, consult the heartbeat when due, apply time-based transitions, persist,
//! and report a [`Decision`]. The whole sequence runs under the engine's lock.

use crate::config::ShieldConfig;
use crate::device::{DeviceIdentity, HardwareFingerprint};
use crate::error::{LicenseError, LicenseResult};
use crate::heartbeat::{DisabledHeartbeat, HeartbeatClient, HeartbeatOutcome};
use crate::key::{LicensePlan, SignatureVerifier};
use crate::record::{ActivationRecord, ActivationStatus};
use crate::store::{RecordStore, SecureStore};
use crate::time::{ClockAnomaly, Clock, SystemClock, TimeIntegrityMonitor};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// No activation exists yet.
    NotActivated,
    TrialActive,
    TrialExpired,
    Licensed,
    GracePeriod,
    LicenseExpired,
    GraceExpired,
    Revoked,
    /// The clock moved backward; the previous state was reported unchanged.
    ClockAnomaly,
}

/// What happened to a key presented with the evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyVerdict {
    /// The key is installed.
    Accepted {
        plan: LicensePlan,
        expires_at: Option<DateTime<Utc>>,
    },
    /// The key was ignored.
    Rejected { reason: String },
}

impl KeyVerdict {
    fn rejected(err: impl std::fmt::Display) -> Self {
        Self::Rejected {
            reason: err.to_string(),
        }
    }

    /// True for [`KeyVerdict::Accepted`].
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the host may run its primary functionality.
    pub allowed: bool,
    /// Status after the evaluation.
    pub status: ActivationStatus,
    /// Time until trial/term end, or until the grace window closes.
    pub remaining: Option<Duration>,
    pub reason: DecisionReason,
    /// Verdict on the presented key, if one was presented.
    pub key: Option<KeyVerdict>,
}

/// Read-only snapshot of the activation state, for diagnostics and host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub app_id: String,
    pub app_name: String,
    pub status: ActivationStatus,
    pub device_id: Option<String>,
    pub activation_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub grace_ends: Option<DateTime<Utc>>,
    pub last_server_check: Option<DateTime<Utc>>,
    pub plan: Option<LicensePlan>,
    pub clock_anomalies: u32,
}

#[derive(Debug, Default)]
struct EngineState {
    last_heartbeat_attempt: Option<DateTime<Utc>>,
}

/// Builder for [`ActivationEngine`].
pub struct EngineBuilder {
    config: ShieldConfig,
    store: Arc<dyn SecureStore>,
    heartbeat: Arc<dyn HeartbeatClient>,
    device: Arc<dyn DeviceIdentity>,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    /// Heartbeat client used when the configuration enables it.
    #[must_use]
    pub fn heartbeat(mut self, heartbeat: Arc<dyn HeartbeatClient>) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Source of the device id for a fresh installation.
    #[must_use]
    pub fn device_identity(mut self, device: Arc<dyn DeviceIdentity>) -> Self {
        self.device = device;
        self
    }

    /// Clock read by [`ActivationEngine::check`] and [`ActivationEngine::activate`].
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> LicenseResult<ActivationEngine> {
        self.config.validate()?;
        let verifier = SignatureVerifier::new(&self.config.public_key)?;
        Ok(ActivationEngine {
            config: self.config,
            records: RecordStore::new(self.store),
            verifier,
            heartbeat: self.heartbeat,
            device: self.device,
            clock: self.clock,
            monitor: TimeIntegrityMonitor::new(),
            state: Mutex::new(EngineState::default()),
        })
    }
}

/// Decides, on each evaluation, whether the host application may run.
pub struct ActivationEngine {
    config: ShieldConfig,
    records: RecordStore,
    verifier: SignatureVerifier,
    heartbeat: Arc<dyn HeartbeatClient>,
    device: Arc<dyn DeviceIdentity>,
    clock: Arc<dyn Clock>,
    monitor: TimeIntegrityMonitor,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for ActivationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationEngine")
            .field("app_id", &self.config.app_id)
            .finish_non_exhaustive()
    }
}

impl ActivationEngine {
    /// Starts a builder with a disabled heartbeat, the hardware fingerprint
    /// and the system clock.
    pub fn builder(config: ShieldConfig, store: Arc<dyn SecureStore>) -> EngineBuilder {
        EngineBuilder {
            config,
            store,
            heartbeat: Arc::new(DisabledHeartbeat),
            device: Arc::new(HardwareFingerprint),
            clock: Arc::new(SystemClock),
        }
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs one evaluation at the clock's current time without a key.
    pub fn check(&self) -> LicenseResult<Decision> {
        self.evaluate(self.clock.now(), None)
    }

    /// Presents a key at the clock's current time.
    pub fn activate(&self, license_key: &str) -> LicenseResult<Decision> {
        self.submit_license_key(self.clock.now(), license_key)
    }

    /// Presents a key entered by the user.
    pub fn submit_license_key(
        &self,
        now: DateTime<Utc>,
        license_key: &str,
    ) -> LicenseResult<Decision> {
        self.evaluate(now, Some(license_key))
    }

    /// Evaluates the activation state at `now`, optionally with a new key.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::StorageUnavailable`] when the record cannot be
    /// read or written; the caller must deny.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        presented_key: Option<&str>,
    ) -> LicenseResult<Decision> {
        let mut state = self.lock()?;
        let mut record = self.load()?;

        let time = self.monitor.check(now, record.last_known_date);
        if time.is_rollback() {
            warn!(
                delta_secs = time.delta.num_seconds(),
                status = %record.status,
                "clock moved backward, evaluation frozen"
            );
            record.clock_anomalies = record.clock_anomalies.saturating_add(1);
            self.save(&record)?;

            let reference = record.last_known_date.unwrap_or(now);
            let mut decision = self.decide(&record, reference, None);
            decision.reason = DecisionReason::ClockAnomaly;
            decision.key = presented_key.map(|_| {
                KeyVerdict::rejected(LicenseError::ClockAnomaly(
                    "device clock is behind the last trusted time".into(),
                ))
            });
            return Ok(decision);
        }
        if time.anomaly == Some(ClockAnomaly::Forward) {
            warn!(delta_secs = time.delta.num_seconds(), "clock leapt forward");
            record.clock_anomalies = record.clock_anomalies.saturating_add(1);
        }

        let device_id = record
            .device_id
            .get_or_insert_with(|| self.device.device_id())
            .clone();

        let key_verdict =
            presented_key.map(|blob| self.accept_key(&mut record, now, blob, &device_id));

        if record.status == ActivationStatus::NotActivated {
            let start = *record.activation_date.get_or_insert(now);
            record.expiry_date = Some(add_clamped(start, self.config.trial_length()));
            record.status = ActivationStatus::Trial;
            info!(device_id = %device_id, expiry = ?record.expiry_date, "trial started");
        }

        let heartbeat = self.heartbeat_if_due(&mut state, &record, now, &device_id);
        let ended = self.apply_transitions(&mut record, now, heartbeat);

        record.last_known_date = Some(match record.last_known_date {
            Some(last) if last > now => last,
            _ => now,
        });
        self.save(&record)?;

        let mut decision = self.decide(&record, now, ended);
        decision.key = key_verdict;
        debug!(
            status = %decision.status,
            allowed = decision.allowed,
            reason = ?decision.reason,
            "evaluation complete"
        );
        Ok(decision)
    }

    /// Snapshot of the stored record. Never writes.
    pub fn info(&self) -> LicenseResult<LicenseInfo> {
        let _state = self.lock()?;
        let record = self.load()?;
        let plan = record
            .license_key
            .as_deref()
            .and_then(|raw| self.verifier.parse(raw).ok())
            .map(|key| key.license_plan());
        let grace_ends = record
            .grace_start
            .map(|start| add_clamped(start, self.config.grace_length()));

        Ok(LicenseInfo {
            app_id: self.config.app_id.clone(),
            app_name: self.config.app_name.clone(),
            status: record.status,
            device_id: record.device_id,
            activation_date: record.activation_date,
            expiry_date: record.expiry_date,
            grace_ends,
            last_server_check: record.last_server_check,
            plan,
            clock_anomalies: record.clock_anomalies,
        })
    }

    /// Deletes every persisted value. For tooling and tests.
    pub fn reset(&self) -> LicenseResult<()> {
        let mut state = self.lock()?;
        self.records.clear()?;
        state.last_heartbeat_attempt = None;
        info!("activation state reset");
        Ok(())
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| LicenseError::StorageUnavailable("engine lock poisoned".into()))
    }

    fn load(&self) -> LicenseResult<ActivationRecord> {
        self.records.load().map_err(|e| {
            warn!(error = %e, "activation record unreadable");
            e.into()
        })
    }

    fn save(&self, record: &ActivationRecord) -> LicenseResult<()> {
        self.records.save(record).map_err(|e| {
            warn!(error = %e, "activation record not persisted");
            e.into()
        })
    }

    fn accept_key(
        &self,
        record: &mut ActivationRecord,
        now: DateTime<Utc>,
        blob: &str,
        device_id: &str,
    ) -> KeyVerdict {
        let key = match self.verifier.parse(blob) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "license key rejected");
                return KeyVerdict::rejected(e);
            }
        };

        if let Some(bound) = key.bound_device().filter(|bound| *bound != device_id) {
            warn!(bound, device_id, "license key bound to another device");
            return KeyVerdict::rejected(LicenseError::DeviceMismatch {
                bound: bound.to_string(),
                actual: device_id.to_string(),
            });
        }

        if record.is_retired(&key.digest()) {
            warn!(status = %record.status, "retired license key presented again");
            return KeyVerdict::rejected(LicenseError::KeyRetired);
        }

        let expires_at = key.expires_at();
        if let Some(end) = expires_at.filter(|end| now > *end) {
            warn!(expired = %end, "license key term already ended");
            return KeyVerdict::rejected(LicenseError::KeyExpired(end.to_rfc3339()));
        }

        let verdict = KeyVerdict::Accepted {
            plan: key.license_plan(),
            expires_at,
        };

        // Re-entering the installed key does not close a grace window.
        if record.status == ActivationStatus::Grace
            && record.license_key.as_deref() == Some(key.raw())
        {
            debug!("installed key presented during grace");
            return verdict;
        }

        record.license_key = Some(key.raw().to_string());
        record.expiry_date = expires_at;
        record.grace_start = None;
        record.activation_date.get_or_insert(now);
        if record.status != ActivationStatus::Licensed {
            info!(from = %record.status, plan = ?key.license_plan(), "license key accepted");
        }
        record.status = ActivationStatus::Licensed;
        verdict
    }

    fn heartbeat_if_due(
        &self,
        state: &mut EngineState,
        record: &ActivationRecord,
        now: DateTime<Utc>,
        device_id: &str,
    ) -> Option<HeartbeatOutcome> {
        if !self.config.heartbeat_enabled || !record.status.is_usable() {
            return None;
        }
        let recently_called = state
            .last_heartbeat_attempt
            .is_some_and(|last| now >= last && now - last < self.config.heartbeat_interval());
        if recently_called {
            return None;
        }

        state.last_heartbeat_attempt = Some(now);
        let outcome = self.heartbeat.report(device_id, record.status);
        match outcome {
            HeartbeatOutcome::Unreachable => {
                warn!(device_id, status = %record.status, "heartbeat unreachable");
            }
            _ => debug!(device_id, ?outcome, "heartbeat answered"),
        }
        Some(outcome)
    }

    /// Applies heartbeat and time-based transitions. Returns the reason when
    /// this evaluation moved the record into Expired.
    fn apply_transitions(
        &self,
        record: &mut ActivationRecord,
        now: DateTime<Utc>,
        heartbeat: Option<HeartbeatOutcome>,
    ) -> Option<DecisionReason> {
        use ActivationStatus::*;

        match heartbeat {
            Some(HeartbeatOutcome::Revoked) => {
                warn!(from = %record.status, "license revoked by server");
                record.retire(Revoked);
                return None;
            }
            Some(HeartbeatOutcome::Ok { renewed_until }) => {
                record.last_server_check = Some(now);
                if let (Some(until), Some(expiry)) = (renewed_until, record.expiry_date) {
                    if matches!(record.status, Licensed | Grace) && until > expiry {
                        info!(until = %until, "license term renewed by server");
                        record.expiry_date = Some(until);
                    }
                }
            }
            _ => {}
        }

        let term_lapsed = record.expiry_date.is_some_and(|end| now > end);
        let confirmed = matches!(heartbeat, Some(HeartbeatOutcome::Ok { .. }));
        let unreachable = heartbeat == Some(HeartbeatOutcome::Unreachable);

        match record.status {
            Trial if term_lapsed => {
                info!("trial expired");
                record.retire(Expired);
                Some(DecisionReason::TrialExpired)
            }
            Licensed if term_lapsed && confirmed => {
                info!("license term ended");
                record.retire(Expired);
                Some(DecisionReason::LicenseExpired)
            }
            Licensed if term_lapsed || unreachable => {
                warn!(term_lapsed, "entering grace period");
                record.status = Grace;
                record.grace_start = Some(now);
                None
            }
            Grace => {
                let grace_end = record
                    .grace_start
                    .map_or(now, |start| add_clamped(start, self.config.grace_length()));
                if now > grace_end {
                    info!("grace period ended");
                    record.retire(Expired);
                    Some(DecisionReason::GraceExpired)
                } else if confirmed && term_lapsed {
                    info!("license term ended");
                    record.retire(Expired);
                    Some(DecisionReason::LicenseExpired)
                } else if confirmed {
                    info!("server contact restored, leaving grace period");
                    record.status = Licensed;
                    record.grace_start = None;
                    None
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn decide(
        &self,
        record: &ActivationRecord,
        now: DateTime<Utc>,
        ended: Option<DecisionReason>,
    ) -> Decision {
        let until = |end: DateTime<Utc>| (end - now).max(Duration::zero());

        let (remaining, reason) = match record.status {
            ActivationStatus::NotActivated => (None, DecisionReason::NotActivated),
            ActivationStatus::Trial => (record.expiry_date.map(until), DecisionReason::TrialActive),
            ActivationStatus::Licensed => (record.expiry_date.map(until), DecisionReason::Licensed),
            ActivationStatus::Grace => (
                record
                    .grace_start
                    .map(|start| until(add_clamped(start, self.config.grace_length()))),
                DecisionReason::GracePeriod,
            ),
            ActivationStatus::Expired => {
                let reason = ended.unwrap_or(if record.retired_key_digests.is_empty() {
                    DecisionReason::TrialExpired
                } else {
                    DecisionReason::LicenseExpired
                });
                (None, reason)
            }
            ActivationStatus::Revoked => (None, DecisionReason::Revoked),
        };

        Decision {
            allowed: record.status.is_usable(),
            status: record.status,
            remaining,
            reason,
            key: None,
        }
    }
}

fn add_clamped(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
