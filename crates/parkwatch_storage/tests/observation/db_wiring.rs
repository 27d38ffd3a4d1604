#![forbid(unsafe_code)]

use chrono::{Duration, TimeZone, Utc};
use parkwatch_kernel_contracts::observation::{
    EvidenceContent, EvidenceInput, EvidenceIntent, EvidenceItemId, ObservationId,
};
use parkwatch_kernel_contracts::vehicle::{PlateKey, VehicleDescription, VehicleId};
use parkwatch_kernel_contracts::{ActorId, SiteId, Timestamp};
use parkwatch_storage::repo::{ObservationRepo, VehicleRepo};
use parkwatch_storage::{EnforcementStore, NewObservation, StorageError};

fn t(hours: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::hours(hours)
}

fn new_obs(key: &str, vehicle_id: Option<VehicleId>) -> NewObservation {
    NewObservation {
        site_id: SiteId::new("lot_a").unwrap(),
        vehicle_id,
        parking_position_id: None,
        location: None,
        observed_at: t(0),
        registration: None,
        idempotency_key: key.to_string(),
        submitted_by: ActorId::new("officer_1").unwrap(),
    }
}

fn photo(key: &str) -> EvidenceInput {
    EvidenceInput {
        content: EvidenceContent::Photo {
            storage_key: key.to_string(),
        },
        intent: None,
    }
}

#[test]
fn at_observation_db_01_idempotency_key_is_unique() {
    let mut s = EnforcementStore::new_in_memory();
    let id = s
        .insert_observation_row(new_obs("obs-1", None), vec![photo("k/1.jpg")], t(0))
        .unwrap();
    assert_eq!(
        s.observation_row_for_idempotency_key("obs-1"),
        Some((id, None))
    );

    let dup = s.insert_observation_row(new_obs("obs-1", None), vec![photo("k/2.jpg")], t(1));
    assert!(matches!(dup, Err(StorageError::DuplicateKey { .. })));
    assert_eq!(s.evidence_rows(id).len(), 1);
}

#[test]
fn at_observation_db_02_evidence_kept_in_creation_order_and_fk_checked() {
    let mut s = EnforcementStore::new_in_memory();
    let vehicle = s
        .resolve_vehicle_row(
            PlateKey::new("ABC123", "CA").unwrap(),
            VehicleDescription::default(),
            t(0),
            t(0),
        )
        .unwrap();

    let id = s
        .insert_observation_row(
            new_obs("obs-2", Some(vehicle)),
            vec![
                photo("k/a.jpg"),
                EvidenceInput {
                    content: EvidenceContent::Note {
                        text: "placard on dash".to_string(),
                    },
                    intent: Some(EvidenceIntent::accessible_placard()),
                },
                photo("k/b.jpg"),
            ],
            t(0),
        )
        .unwrap();

    let rows = s.evidence_rows(id);
    assert_eq!(rows.len(), 3);
    assert!(rows.windows(2).all(|w| w[0].evidence_id < w[1].evidence_id));
    assert!(rows[1].is_accessible_placard());
    assert!(s.observation_has_placard_evidence(id));

    let missing_vehicle = s.insert_observation_row(
        new_obs("obs-3", Some(VehicleId(404))),
        vec![photo("k/c.jpg")],
        t(1),
    );
    assert!(matches!(
        missing_vehicle,
        Err(StorageError::ForeignKeyViolation { .. })
    ));
}

#[test]
fn at_observation_db_03_observations_and_evidence_are_append_only() {
    let mut s = EnforcementStore::new_in_memory();
    let id = s
        .insert_observation_row(new_obs("obs-4", None), vec![photo("k/1.jpg")], t(0))
        .unwrap();
    assert_eq!(
        s.attempt_overwrite_observation_row(id),
        Err(StorageError::AppendOnlyViolation {
            table: "observations"
        })
    );
    assert_eq!(
        s.attempt_overwrite_evidence_row(EvidenceItemId(1)),
        Err(StorageError::AppendOnlyViolation {
            table: "evidence_items"
        })
    );
}

#[test]
fn at_observation_db_04_empty_evidence_or_failed_transaction_persists_nothing() {
    let mut s = EnforcementStore::new_in_memory();
    let empty = s.insert_observation_row(new_obs("obs-5", None), Vec::new(), t(0));
    assert!(matches!(empty, Err(StorageError::ContractViolation(_))));
    assert!(s.observation_row_for_idempotency_key("obs-5").is_none());

    let out: Result<ObservationId, StorageError> = s.transaction(|tx| {
        tx.insert_observation_row(new_obs("obs-6", None), vec![photo("k/1.jpg")], t(0))?;
        Err(StorageError::LockPoisoned)
    });
    assert!(out.is_err());
    assert!(s.observation_row_for_idempotency_key("obs-6").is_none());
    assert!(s.observation_row(ObservationId(1)).is_none());
}

#[test]
fn at_observation_db_05_soft_delete_hides_row_but_keeps_key_reserved() {
    let mut s = EnforcementStore::new_in_memory();
    let id = s
        .insert_observation_row(new_obs("obs-7", None), vec![photo("k/1.jpg")], t(0))
        .unwrap();
    s.soft_delete_observation_row(id, t(1)).unwrap();

    assert!(s.observation_row(id).is_none());
    assert!(s.evidence_rows(id).is_empty());
    assert_eq!(
        s.observation_row_for_idempotency_key("obs-7"),
        Some((id, None))
    );
    assert!(matches!(
        s.insert_observation_row(new_obs("obs-7", None), vec![photo("k/2.jpg")], t(2)),
        Err(StorageError::DuplicateKey { .. })
    ));
}
