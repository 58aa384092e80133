mod common;

use chrono::Duration;
use common::{
    engine, engine_with, heartbeat_config, key_until, make_key, perpetual_key, stored_record, t0,
    test_config, FixedDevice, ScriptedHeartbeat, DEVICE,
};
use pretty_assertions::assert_eq;
use shield_license::{
    ActivationEngine, ActivationRecord, ActivationStatus, DecisionReason, HeartbeatOutcome,
    KeyVerdict, LicenseError, LicensePlan, LicenseSigner, ManualClock, MemoryStore, RecordStore,
    ShieldConfig,
};
use std::sync::Arc;

fn seed(store: &Arc<MemoryStore>, record: &ActivationRecord) {
    RecordStore::new(store.clone()).save(record).unwrap();
}

fn licensed(engine: &ActivationEngine, key: &str) {
    let decision = engine.submit_license_key(t0(), key).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);
}

// ── Trial ────────────────────────────────────────────────────────

#[test]
fn first_evaluation_starts_trial() {
    let (engine, store) = engine();
    let decision = engine.evaluate(t0(), None).unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.status, ActivationStatus::Trial);
    assert_eq!(decision.reason, DecisionReason::TrialActive);
    assert_eq!(decision.remaining, Some(Duration::days(30)));
    assert_eq!(decision.key, None);

    let record = stored_record(&store);
    assert_eq!(record.activation_date, Some(t0()));
    assert_eq!(record.expiry_date, Some(t0() + Duration::days(30)));
    assert_eq!(record.device_id.as_deref(), Some(DEVICE));
    assert_eq!(record.last_known_date, Some(t0()));
    assert!(record.is_consistent());
}

#[test]
fn trial_length_follows_config() {
    let config = ShieldConfig {
        trial_days: 7,
        ..test_config()
    };
    let (engine, store) = engine_with(config, None);
    engine.evaluate(t0(), None).unwrap();
    assert_eq!(stored_record(&store).expiry_date, Some(t0() + Duration::days(7)));
}

#[test]
fn trial_counts_down() {
    let (engine, _) = engine();
    engine.evaluate(t0(), None).unwrap();
    let decision = engine.evaluate(t0() + Duration::days(10), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Trial);
    assert_eq!(decision.remaining, Some(Duration::days(20)));
}

#[test]
fn trial_still_active_at_exact_expiry() {
    let (engine, _) = engine();
    engine.evaluate(t0(), None).unwrap();
    let decision = engine.evaluate(t0() + Duration::days(30), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Trial);
    assert_eq!(decision.remaining, Some(Duration::zero()));
}

#[test]
fn trial_expires_after_expiry() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    let decision = engine
        .evaluate(t0() + Duration::days(30) + Duration::seconds(1), None)
        .unwrap();

    assert!(!decision.allowed);
    assert_eq!(decision.status, ActivationStatus::Expired);
    assert_eq!(decision.reason, DecisionReason::TrialExpired);

    let record = stored_record(&store);
    assert_eq!(record.expiry_date, None);
    assert_eq!(record.activation_date, Some(t0()));
    assert!(record.is_consistent());
}

#[test]
fn expired_trial_stays_expired() {
    let (engine, _) = engine();
    engine.evaluate(t0(), None).unwrap();
    engine.evaluate(t0() + Duration::days(31), None).unwrap();
    let decision = engine.evaluate(t0() + Duration::days(32), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Expired);
    assert_eq!(decision.reason, DecisionReason::TrialExpired);
}

#[test]
fn deleting_status_does_not_restart_trial_clock() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    engine.evaluate(t0() + Duration::days(31), None).unwrap();

    // Wipe only the status entry.
    shield_license::SecureStore::delete(&*store, shield_license::StoreKey::ActivationStatus)
        .unwrap();
    let decision = engine.evaluate(t0() + Duration::days(32), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Expired);
}

// ── Key acceptance ───────────────────────────────────────────────

#[test]
fn valid_key_licenses_from_trial() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();

    let later = t0() + Duration::days(3);
    let decision = engine.submit_license_key(later, &perpetual_key()).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.status, ActivationStatus::Licensed);
    assert_eq!(decision.reason, DecisionReason::Licensed);
    assert_eq!(decision.remaining, None);
    assert_eq!(
        decision.key,
        Some(KeyVerdict::Accepted {
            plan: LicensePlan::Perpetual,
            expires_at: None
        })
    );

    let record = stored_record(&store);
    assert_eq!(record.activation_date, Some(t0()));
    assert_eq!(record.expiry_date, None);
    assert_eq!(record.license_key.as_deref(), Some(perpetual_key().as_str()));
    assert!(record.is_consistent());
}

#[test]
fn valid_key_on_fresh_install_licenses_directly() {
    let (engine, store) = engine();
    let decision = engine.submit_license_key(t0(), &perpetual_key()).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);
    assert_eq!(stored_record(&store).activation_date, Some(t0()));
}

#[test]
fn term_key_sets_expiry() {
    let (engine, store) = engine();
    let key = make_key(LicensePlan::Annual, t0(), Some(DEVICE));
    let decision = engine.submit_license_key(t0(), &key).unwrap();
    assert_eq!(decision.remaining, Some(Duration::days(365)));
    assert_eq!(stored_record(&store).expiry_date, Some(t0() + Duration::days(365)));
}

#[test]
fn unbound_key_is_accepted() {
    let (engine, _) = engine();
    let key = make_key(LicensePlan::Perpetual, t0(), None);
    let decision = engine.submit_license_key(t0(), &key).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);
}

#[test]
fn key_for_other_device_is_rejected() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();

    let key = make_key(LicensePlan::Perpetual, t0(), Some("some-other-device"));
    let decision = engine.submit_license_key(t0(), &key).unwrap();

    assert_eq!(decision.status, ActivationStatus::Trial);
    let Some(KeyVerdict::Rejected { reason }) = decision.key else {
        panic!("expected rejection, got {:?}", decision.key);
    };
    assert!(reason.contains("some-other-device"));
    assert_eq!(stored_record(&store).license_key, None);
}

#[test]
fn bad_signature_never_licenses_from_any_state() {
    let forged = LicenseSigner::from_seed(&[7u8; 32])
        .sign(&shield_license::LicensePayload {
            sub: None,
            device_id: Some(DEVICE.to_string()),
            plan: LicensePlan::Perpetual,
            iat: t0().timestamp(),
            exp: None,
        })
        .unwrap();

    let statuses = [
        ActivationStatus::NotActivated,
        ActivationStatus::Trial,
        ActivationStatus::Grace,
        ActivationStatus::Expired,
        ActivationStatus::Revoked,
    ];
    for status in statuses {
        let (engine, store) = engine();
        let mut record = ActivationRecord {
            status,
            device_id: Some(DEVICE.to_string()),
            last_known_date: Some(t0()),
            ..ActivationRecord::fresh()
        };
        match status {
            ActivationStatus::Trial => record.expiry_date = Some(t0() + Duration::days(5)),
            ActivationStatus::Grace => {
                record.license_key = Some(key_until(t0() - Duration::days(1), Some(DEVICE)));
                record.grace_start = Some(t0());
            }
            _ => {}
        }
        seed(&store, &record);

        for blob in [forged.as_str(), "", "x.y", "not a key at all"] {
            let decision = engine.submit_license_key(t0(), blob).unwrap();
            assert_ne!(decision.status, ActivationStatus::Licensed, "from {status}");
            assert!(matches!(decision.key, Some(KeyVerdict::Rejected { .. })));
        }
    }
}

#[test]
fn key_with_ended_term_is_rejected() {
    let (engine, _) = engine();
    let key = key_until(t0() - Duration::days(1), Some(DEVICE));
    let decision = engine.submit_license_key(t0(), &key).unwrap();
    assert_eq!(decision.status, ActivationStatus::Trial);
    assert!(!decision.key.unwrap().is_accepted());
}

#[test]
fn same_key_twice_is_idempotent() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    let at = t0() + Duration::hours(1);

    let first = engine.submit_license_key(at, &perpetual_key()).unwrap();
    let after_first = stored_record(&store);
    let second = engine.submit_license_key(at, &perpetual_key()).unwrap();
    let after_second = stored_record(&store);

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
}

#[test]
fn expired_trial_licenses_with_valid_key() {
    let (engine, _) = engine();
    engine.evaluate(t0(), None).unwrap();
    let later = t0() + Duration::days(31);
    assert_eq!(
        engine.evaluate(later, None).unwrap().status,
        ActivationStatus::Expired
    );
    let decision = engine.submit_license_key(later, &perpetual_key()).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);
}

#[test]
fn licensed_key_term_lapse_without_heartbeat_enters_grace() {
    let (engine, store) = engine();
    let end = t0() + Duration::days(10);
    engine
        .submit_license_key(t0(), &key_until(end, Some(DEVICE)))
        .unwrap();

    let lapse = end + Duration::hours(1);
    let decision = engine.evaluate(lapse, None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Grace);
    assert_eq!(decision.reason, DecisionReason::GracePeriod);
    assert_eq!(decision.remaining, Some(Duration::hours(72)));
    assert_eq!(stored_record(&store).grace_start, Some(lapse));

    let decision = engine.evaluate(lapse + Duration::hours(73), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Expired);
    assert_eq!(decision.reason, DecisionReason::GraceExpired);
}

#[test]
fn expired_license_key_is_retired() {
    let (engine, store) = engine();
    let end = t0() + Duration::days(10);
    let key = key_until(end, Some(DEVICE));
    engine.submit_license_key(t0(), &key).unwrap();
    engine.evaluate(end + Duration::hours(1), None).unwrap();
    engine.evaluate(end + Duration::hours(100), None).unwrap();

    let record = stored_record(&store);
    assert_eq!(record.status, ActivationStatus::Expired);
    assert_eq!(record.license_key, None);
    assert_eq!(record.retired_key_digests, vec![shield_license::key_digest(&key)]);
    assert!(record.is_consistent());

    let decision = engine.evaluate(end + Duration::hours(101), None).unwrap();
    assert_eq!(decision.reason, DecisionReason::LicenseExpired);
}

#[test]
fn retired_key_is_refused() {
    let (engine, store) = engine();
    let key = perpetual_key();
    seed(
        &store,
        &ActivationRecord {
            status: ActivationStatus::Revoked,
            device_id: Some(DEVICE.to_string()),
            last_known_date: Some(t0()),
            retired_key_digests: vec![shield_license::key_digest(&key)],
            ..ActivationRecord::fresh()
        },
    );

    let decision = engine.submit_license_key(t0(), &key).unwrap();
    assert_eq!(decision.status, ActivationStatus::Revoked);
    assert!(!decision.allowed);
    let Some(KeyVerdict::Rejected { reason }) = decision.key else {
        panic!("expected rejection");
    };
    assert!(reason.contains("retired"));

    let replacement = make_key(LicensePlan::Annual, t0(), Some(DEVICE));
    let decision = engine.submit_license_key(t0(), &replacement).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);
}

#[test]
fn earlier_retired_keys_stay_refused() {
    let (engine, store) = engine();
    let first = perpetual_key();
    seed(
        &store,
        &ActivationRecord {
            status: ActivationStatus::Revoked,
            device_id: Some(DEVICE.to_string()),
            last_known_date: Some(t0()),
            retired_key_digests: vec![shield_license::key_digest(&first)],
            ..ActivationRecord::fresh()
        },
    );

    let end = t0() + Duration::days(10);
    let second = key_until(end, Some(DEVICE));
    licensed(&engine, &second);
    engine.evaluate(end + Duration::hours(1), None).unwrap();
    let decision = engine.evaluate(end + Duration::hours(100), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Expired);

    let record = stored_record(&store);
    assert_eq!(
        record.retired_key_digests,
        vec![shield_license::key_digest(&first), shield_license::key_digest(&second)]
    );
    for key in [&first, &second] {
        let decision = engine
            .submit_license_key(end + Duration::hours(101), key)
            .unwrap();
        assert_eq!(decision.status, ActivationStatus::Expired);
        assert!(!decision.allowed);
        assert!(matches!(decision.key, Some(KeyVerdict::Rejected { .. })));
    }
}

// ── Heartbeat ────────────────────────────────────────────────────

#[test]
fn heartbeat_not_called_when_disabled() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::Revoked));
    let (engine, _) = engine_with(test_config(), Some(hb.clone()));
    engine.submit_license_key(t0(), &perpetual_key()).unwrap();
    engine.evaluate(t0() + Duration::days(2), None).unwrap();
    assert!(hb.calls().is_empty());
}

#[test]
fn heartbeat_respects_interval() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::CONFIRMED));
    let (engine, store) = engine_with(heartbeat_config(), Some(hb.clone()));
    licensed(&engine, &perpetual_key());
    engine.evaluate(t0() + Duration::minutes(30), None).unwrap();
    assert_eq!(hb.calls().len(), 1);
    assert_eq!(hb.calls()[0], (DEVICE.to_string(), ActivationStatus::Licensed));
    assert_eq!(stored_record(&store).last_server_check, Some(t0()));

    engine.evaluate(t0() + Duration::minutes(61), None).unwrap();
    assert_eq!(hb.calls().len(), 2);
}

#[test]
fn heartbeat_skipped_in_terminal_states() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::CONFIRMED));
    let (engine, store) = engine_with(heartbeat_config(), Some(hb.clone()));
    seed(
        &store,
        &ActivationRecord {
            status: ActivationStatus::Expired,
            device_id: Some(DEVICE.to_string()),
            last_known_date: Some(t0()),
            ..ActivationRecord::fresh()
        },
    );
    engine.evaluate(t0(), None).unwrap();
    assert!(hb.calls().is_empty());
}

#[test]
fn unreachable_heartbeat_moves_licensed_to_grace() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::Unreachable));
    let (engine, store) = engine_with(heartbeat_config(), Some(hb));
    let decision = engine.submit_license_key(t0(), &perpetual_key()).unwrap();

    assert_eq!(decision.status, ActivationStatus::Grace);
    assert!(decision.allowed);
    let record = stored_record(&store);
    assert_eq!(record.grace_start, Some(t0()));
    assert!(record.license_key.is_some());
    assert!(record.is_consistent());
}

#[test]
fn grace_returns_to_licensed_on_contact() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::CONFIRMED));
    hb.push(HeartbeatOutcome::Unreachable);
    let (engine, store) = engine_with(heartbeat_config(), Some(hb));

    let decision = engine.submit_license_key(t0(), &perpetual_key()).unwrap();
    assert_eq!(decision.status, ActivationStatus::Grace);

    let back = t0() + Duration::hours(2);
    let decision = engine.evaluate(back, None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);
    let record = stored_record(&store);
    assert_eq!(record.grace_start, None);
    assert_eq!(record.last_server_check, Some(back));
}

#[test]
fn reentering_installed_key_keeps_grace_window() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::Unreachable));
    let (engine, store) = engine_with(heartbeat_config(), Some(hb));
    engine.submit_license_key(t0(), &perpetual_key()).unwrap();

    let decision = engine
        .submit_license_key(t0() + Duration::minutes(10), &perpetual_key())
        .unwrap();
    assert_eq!(decision.status, ActivationStatus::Grace);
    assert!(decision.key.unwrap().is_accepted());
    assert_eq!(stored_record(&store).grace_start, Some(t0()));
}

#[test]
fn revocation_is_terminal() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::Revoked));
    let (engine, store) = engine_with(heartbeat_config(), Some(hb.clone()));
    let key = perpetual_key();

    let decision = engine.submit_license_key(t0(), &key).unwrap();
    assert_eq!(decision.status, ActivationStatus::Revoked);
    assert_eq!(decision.reason, DecisionReason::Revoked);
    assert!(!decision.allowed);

    let record = stored_record(&store);
    assert_eq!(record.license_key, None);
    assert!(record.is_consistent());

    let later = t0() + Duration::days(5);
    assert_eq!(
        engine.evaluate(later, None).unwrap().status,
        ActivationStatus::Revoked
    );
    let again = engine.submit_license_key(later, &key).unwrap();
    assert_eq!(again.status, ActivationStatus::Revoked);
    assert_eq!(hb.calls().len(), 1);
}

#[test]
fn revocation_during_trial() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::Revoked));
    let (engine, _) = engine_with(heartbeat_config(), Some(hb));
    let decision = engine.evaluate(t0(), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Revoked);
}

#[test]
fn confirmed_heartbeat_after_term_lapse_expires() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::CONFIRMED));
    let (engine, _) = engine_with(heartbeat_config(), Some(hb));
    let end = t0() + Duration::days(10);
    engine
        .submit_license_key(t0(), &key_until(end, Some(DEVICE)))
        .unwrap();

    let decision = engine.evaluate(end + Duration::hours(1), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Expired);
    assert_eq!(decision.reason, DecisionReason::LicenseExpired);
}

#[test]
fn server_renewal_extends_term() {
    let hb = Arc::new(ScriptedHeartbeat::always(HeartbeatOutcome::CONFIRMED));
    let end = t0() + Duration::days(10);
    let renewed = end + Duration::days(30);
    hb.push(HeartbeatOutcome::CONFIRMED);
    hb.push(HeartbeatOutcome::Ok {
        renewed_until: Some(renewed),
    });
    let (engine, store) = engine_with(heartbeat_config(), Some(hb));
    engine
        .submit_license_key(t0(), &key_until(end, Some(DEVICE)))
        .unwrap();

    let decision = engine.evaluate(end + Duration::hours(1), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);
    assert_eq!(stored_record(&store).expiry_date, Some(renewed));
}

// ── Clock integrity ──────────────────────────────────────────────

#[test]
fn rollback_freezes_trial() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    let anchor = t0() + Duration::days(20);
    engine.evaluate(anchor, None).unwrap();

    let decision = engine.evaluate(anchor - Duration::days(1), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Trial);
    assert!(decision.allowed);
    assert_eq!(decision.reason, DecisionReason::ClockAnomaly);
    assert_eq!(decision.remaining, Some(Duration::days(10)));

    let record = stored_record(&store);
    assert_eq!(record.last_known_date, Some(anchor));
    assert_eq!(record.clock_anomalies, 1);
}

#[test]
fn rollback_does_not_resurrect_expired_trial() {
    let (engine, _) = engine();
    engine.evaluate(t0(), None).unwrap();
    engine.evaluate(t0() + Duration::days(31), None).unwrap();

    let decision = engine.evaluate(t0() + Duration::days(2), None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Expired);
    assert!(!decision.allowed);
    assert_eq!(decision.reason, DecisionReason::ClockAnomaly);
}

#[test]
fn rollback_blocks_key_acceptance() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    let decision = engine
        .submit_license_key(t0() - Duration::days(1), &perpetual_key())
        .unwrap();
    assert_eq!(decision.status, ActivationStatus::Trial);
    assert!(!decision.key.unwrap().is_accepted());
    assert_eq!(stored_record(&store).license_key, None);
}

#[test]
fn skew_within_tolerance_does_not_move_anchor_back() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    let decision = engine.evaluate(t0() - Duration::minutes(2), None).unwrap();
    assert_eq!(decision.reason, DecisionReason::TrialActive);

    let record = stored_record(&store);
    assert_eq!(record.last_known_date, Some(t0()));
    assert_eq!(record.clock_anomalies, 0);
}

#[test]
fn forward_jump_is_counted_but_permitted() {
    let (engine, store) = engine();
    engine.submit_license_key(t0(), &perpetual_key()).unwrap();
    let far = t0() + Duration::days(400);
    let decision = engine.evaluate(far, None).unwrap();
    assert_eq!(decision.status, ActivationStatus::Licensed);

    let record = stored_record(&store);
    assert_eq!(record.clock_anomalies, 1);
    assert_eq!(record.last_known_date, Some(far));
}

// ── Storage ──────────────────────────────────────────────────────

#[test]
fn unreadable_store_is_storage_unavailable() {
    let (engine, store) = engine();
    store.set_fail_reads(true);
    let err = engine.evaluate(t0(), None).unwrap_err();
    assert!(matches!(err, LicenseError::StorageUnavailable(_)));
}

#[test]
fn unwritable_store_is_storage_unavailable() {
    let (engine, store) = engine();
    store.set_fail_writes(true);
    let err = engine.evaluate(t0(), None).unwrap_err();
    assert!(matches!(err, LicenseError::StorageUnavailable(_)));
}

#[test]
fn refused_save_does_not_leave_an_endless_trial() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();

    store.set_fail_writes(true);
    let err = engine.evaluate(t0() + Duration::days(31), None).unwrap_err();
    assert!(matches!(err, LicenseError::StorageUnavailable(_)));
    store.set_fail_writes(false);

    let record = stored_record(&store);
    assert_eq!(record.status, ActivationStatus::Trial);
    assert_eq!(record.expiry_date, Some(t0() + Duration::days(30)));

    let decision = engine.evaluate(t0() + Duration::days(400), None).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.status, ActivationStatus::Expired);
}

#[test]
fn missing_expiry_entry_is_storage_unavailable() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    shield_license::SecureStore::delete(&*store, shield_license::StoreKey::ExpiryDate).unwrap();

    assert!(matches!(
        engine.evaluate(t0() + Duration::days(365), None),
        Err(LicenseError::StorageUnavailable(_))
    ));
}

#[test]
fn missing_rollback_anchor_is_storage_unavailable() {
    let (engine, store) = engine();
    engine.submit_license_key(t0(), &perpetual_key()).unwrap();
    shield_license::SecureStore::delete(&*store, shield_license::StoreKey::LastKnownDate)
        .unwrap();

    assert!(matches!(
        engine.evaluate(t0() - Duration::days(10), None),
        Err(LicenseError::StorageUnavailable(_))
    ));
}

#[test]
fn corrupt_status_is_storage_unavailable() {
    let (engine, store) = engine();
    shield_license::SecureStore::set(
        &*store,
        shield_license::StoreKey::ActivationStatus,
        b"lifetime",
    )
    .unwrap();
    assert!(matches!(
        engine.evaluate(t0(), None),
        Err(LicenseError::StorageUnavailable(_))
    ));
}

// ── Info, reset, clock-driven calls ──────────────────────────────

#[test]
fn info_reports_without_writing() {
    let (engine, store) = engine();
    let empty = engine.info().unwrap();
    assert_eq!(empty.status, ActivationStatus::NotActivated);
    assert_eq!(empty.device_id, None);
    assert!(store.is_empty());

    engine
        .submit_license_key(t0(), &make_key(LicensePlan::Monthly, t0(), Some(DEVICE)))
        .unwrap();
    let info = engine.info().unwrap();
    assert_eq!(info.status, ActivationStatus::Licensed);
    assert_eq!(info.plan, Some(LicensePlan::Monthly));
    assert_eq!(info.device_id.as_deref(), Some(DEVICE));
    assert_eq!(info.app_id, "com.icontrol.wda");
}

#[test]
fn reset_clears_everything() {
    let (engine, store) = engine();
    engine.evaluate(t0(), None).unwrap();
    engine.reset().unwrap();
    assert!(store.is_empty());
    assert_eq!(stored_record(&store), ActivationRecord::fresh());
}

#[test]
fn check_and_activate_use_injected_clock() {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryStore::new());
    let engine = ActivationEngine::builder(test_config(), store.clone())
        .device_identity(Arc::new(FixedDevice(DEVICE.to_string())))
        .clock(clock.clone())
        .build()
        .unwrap();

    assert_eq!(engine.check().unwrap().status, ActivationStatus::Trial);
    clock.advance(Duration::days(31));
    assert_eq!(engine.now(), t0() + Duration::days(31));
    assert_eq!(engine.check().unwrap().status, ActivationStatus::Expired);
    assert_eq!(
        engine.activate(&perpetual_key()).unwrap().status,
        ActivationStatus::Licensed
    );
}

#[test]
fn build_rejects_invalid_config() {
    let config = ShieldConfig {
        grace_hours: 0,
        ..test_config()
    };
    let err = ActivationEngine::builder(config, Arc::new(MemoryStore::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, LicenseError::Config(_)));
}

#[test]
fn builtin_key_rejects_test_signed_keys() {
    let engine = ActivationEngine::builder(ShieldConfig::builtin(), Arc::new(MemoryStore::new()))
        .device_identity(Arc::new(FixedDevice(DEVICE.to_string())))
        .build()
        .unwrap();
    let decision = engine.submit_license_key(t0(), &perpetual_key()).unwrap();
    assert_eq!(decision.status, ActivationStatus::Trial);
    assert!(!decision.key.unwrap().is_accepted());
}
