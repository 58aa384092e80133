//! The persisted activation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many retired key digests a record remembers; the oldest is dropped
/// beyond this.
pub const MAX_RETIRED_KEYS: usize = 16;

/// Licensing state of an installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    /// No evaluation has activated anything yet.
    #[default]
    NotActivated,
    /// Time-limited trial.
    Trial,
    /// A verified license key is in force.
    Licensed,
    /// Licensed, but server contact was lost; usable for a bounded window.
    Grace,
    /// Trial, license term, or grace window ran out.
    Expired,
    /// The heartbeat server revoked the license.
    Revoked,
}

impl ActivationStatus {
    /// Returns true if the host may run its primary functionality.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Trial | Self::Licensed | Self::Grace)
    }

    /// Stable storage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotActivated => "not_activated",
            Self::Trial => "trial",
            Self::Licensed => "licensed",
            Self::Grace => "grace",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    /// Parses a storage name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "not_activated" => Some(Self::NotActivated),
            "trial" => Some(Self::Trial),
            "licensed" => Some(Self::Licensed),
            "grace" => Some(Self::Grace),
            "expired" => Some(Self::Expired),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One installation's activation state.
///
/// Only [`crate::ActivationEngine`] mutates a record, once per evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Current state.
    pub status: ActivationStatus,
    /// First successful trial start or licensing; never overwritten.
    pub activation_date: Option<DateTime<Utc>>,
    /// Trial end or license term end.
    pub expiry_date: Option<DateTime<Utc>>,
    /// Generated once, immutable afterwards.
    pub device_id: Option<String>,
    /// Raw key string; present in Licensed and Grace.
    pub license_key: Option<String>,
    /// Last successful heartbeat.
    pub last_server_check: Option<DateTime<Utc>>,
    /// Most recent trusted evaluation time; rollback anchor.
    pub last_known_date: Option<DateTime<Utc>>,
    /// Entry into Grace; present iff status is Grace.
    pub grace_start: Option<DateTime<Utc>>,
    /// Number of clock anomalies observed.
    pub clock_anomalies: u32,
    /// Digests of keys that ended in Expired or Revoked, oldest first.
    pub retired_key_digests: Vec<String>,
}

impl ActivationRecord {
    /// A record for an installation with no prior state.
    #[must_use]
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Moves into a terminal state, dropping the key and all time windows.
    pub(crate) fn retire(&mut self, status: ActivationStatus) {
        debug_assert!(matches!(
            status,
            ActivationStatus::Expired | ActivationStatus::Revoked
        ));
        if let Some(raw) = self.license_key.take() {
            let digest = crate::key::key_digest(&raw);
            if !self.retired_key_digests.contains(&digest) {
                self.retired_key_digests.push(digest);
            }
            let excess = self.retired_key_digests.len().saturating_sub(MAX_RETIRED_KEYS);
            self.retired_key_digests.drain(..excess);
        }
        self.status = status;
        self.expiry_date = None;
        self.grace_start = None;
    }

    /// True when `digest` belongs to a key this installation retired.
    #[must_use]
    pub fn is_retired(&self, digest: &str) -> bool {
        self.retired_key_digests.iter().any(|d| d == digest)
    }

    /// Checks the structural invariants between status and optional fields.
    ///
    /// Every evaluation leaves an activated record with a device id and a
    /// rollback anchor, so their absence means the record was cut short.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        use ActivationStatus::*;
        let anchored = self.status == NotActivated
            || (self.device_id.is_some() && self.last_known_date.is_some());
        let grace_ok = self.grace_start.is_some() == (self.status == Grace);
        let key_ok = match self.status {
            Licensed | Grace => self.license_key.is_some(),
            _ => self.license_key.is_none(),
        };
        let expiry_ok = match self.status {
            Trial => self.expiry_date.is_some(),
            NotActivated | Expired | Revoked => self.expiry_date.is_none(),
            Licensed | Grace => true,
        };
        anchored && grace_ok && key_ok && expiry_ok
    }
}
