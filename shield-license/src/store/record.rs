//! Typed mapping of [`ActivationRecord`] onto the symbolic store keys.

use super::{SecureStore, StoreError, StoreKey, StoreResult, StoreWrite};
use crate::record::{ActivationRecord, ActivationStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Loads and saves the activation record through a [`SecureStore`].
///
/// Timestamps are RFC 3339 UTC strings with full sub-second precision, so a
/// saved record loads back equal. Absent optionals are deleted rather than
/// written empty. A save is a single [`SecureStore::write_batch`].
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn SecureStore>,
}

impl RecordStore {
    /// Wraps a store.
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn SecureStore> {
        &self.store
    }

    /// Reads the record. Keys that were never written load as empty fields,
    /// so a store with no prior entry yields [`ActivationRecord::fresh`].
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] when a value does not decode, or when the
    /// fields present do not form a consistent record (for example a trial
    /// with no expiry).
    pub fn load(&self) -> StoreResult<ActivationRecord> {
        let status = match self.text(StoreKey::ActivationStatus)? {
            Some(name) => ActivationStatus::from_name(&name).ok_or_else(|| StoreError::Corrupt {
                key: StoreKey::ActivationStatus.name(),
                reason: format!("unknown status '{name}'"),
            })?,
            None => ActivationStatus::NotActivated,
        };

        let clock_anomalies = match self.text(StoreKey::ClockAnomalies)? {
            Some(text) => text.parse().map_err(|e| StoreError::Corrupt {
                key: StoreKey::ClockAnomalies.name(),
                reason: format!("{e}"),
            })?,
            None => 0,
        };

        let retired_key_digests = self
            .text(StoreKey::RetiredKeys)?
            .map(|list| list.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        let record = ActivationRecord {
            status,
            activation_date: self.timestamp(StoreKey::ActivationDate)?,
            expiry_date: self.timestamp(StoreKey::ExpiryDate)?,
            device_id: self.text(StoreKey::DeviceId)?,
            license_key: self.text(StoreKey::LicenseKey)?,
            last_server_check: self.timestamp(StoreKey::LastServerCheck)?,
            last_known_date: self.timestamp(StoreKey::LastKnownDate)?,
            grace_start: self.timestamp(StoreKey::GraceStart)?,
            clock_anomalies,
            retired_key_digests,
        };
        if !record.is_consistent() {
            return Err(StoreError::Corrupt {
                key: StoreKey::ActivationStatus.name(),
                reason: format!("incomplete {} record", record.status),
            });
        }
        Ok(record)
    }

    /// Writes every field in one batch.
    pub fn save(&self, record: &ActivationRecord) -> StoreResult<()> {
        let values: Vec<(StoreKey, Option<String>)> = StoreKey::ALL
            .into_iter()
            .map(|key| (key, encode_field(record, key)))
            .collect();
        let writes: Vec<StoreWrite<'_>> = values
            .iter()
            .map(|(key, value)| match value {
                Some(v) => StoreWrite::Set(*key, v.as_bytes()),
                None => StoreWrite::Delete(*key),
            })
            .collect();
        self.store.write_batch(&writes)
    }

    /// Deletes every key in one batch.
    pub fn clear(&self) -> StoreResult<()> {
        let writes: Vec<StoreWrite<'_>> =
            StoreKey::ALL.into_iter().map(StoreWrite::Delete).collect();
        self.store.write_batch(&writes)
    }

    fn text(&self, key: StoreKey) -> StoreResult<Option<String>> {
        self.store
            .get(key)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|_| StoreError::Corrupt {
                    key: key.name(),
                    reason: "not UTF-8".into(),
                })
            })
            .transpose()
    }

    fn timestamp(&self, key: StoreKey) -> StoreResult<Option<DateTime<Utc>>> {
        self.text(key)?
            .map(|text| {
                DateTime::parse_from_rfc3339(&text)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| StoreError::Corrupt {
                        key: key.name(),
                        reason: e.to_string(),
                    })
            })
            .transpose()
    }
}

fn encode_field(record: &ActivationRecord, key: StoreKey) -> Option<String> {
    match key {
        StoreKey::ActivationStatus => Some(record.status.as_str().to_string()),
        StoreKey::ActivationDate => record.activation_date.map(format_ts),
        StoreKey::ExpiryDate => record.expiry_date.map(format_ts),
        StoreKey::DeviceId => record.device_id.clone(),
        StoreKey::LicenseKey => record.license_key.clone(),
        StoreKey::LastServerCheck => record.last_server_check.map(format_ts),
        StoreKey::LastKnownDate => record.last_known_date.map(format_ts),
        StoreKey::GraceStart => record.grace_start.map(format_ts),
        StoreKey::ClockAnomalies => {
            (record.clock_anomalies > 0).then(|| record.clock_anomalies.to_string())
        }
        StoreKey::RetiredKeys => {
            (!record.retired_key_digests.is_empty()).then(|| record.retired_key_digests.join(","))
        }
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
