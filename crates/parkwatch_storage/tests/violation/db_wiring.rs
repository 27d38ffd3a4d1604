#![forbid(unsafe_code)]

use chrono::{Duration, TimeZone, Utc};
use parkwatch_kernel_contracts::observation::{EvidenceContent, EvidenceInput, ObservationId};
use parkwatch_kernel_contracts::position::{
    GeoPoint, ParkingPositionId, ParkingPositionInput, ParkingPositionType,
};
use parkwatch_kernel_contracts::vehicle::{PlateKey, VehicleDescription, VehicleId};
use parkwatch_kernel_contracts::violation::{
    OpenViolationKey, ViolationCategory, ViolationEventId, ViolationEventInput, ViolationEventType,
    ViolationId, ViolationStatus,
};
use parkwatch_kernel_contracts::{ActorId, SiteId, Timestamp};
use parkwatch_storage::repo::{
    ObservationRepo, ParkingPositionRepo, VehicleRepo, ViolationLedgerRepo,
};
use parkwatch_storage::{EnforcementStore, NewObservation, NewViolation, StorageError};
use proptest::prelude::*;

fn t(hours: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::hours(hours)
}

fn actor() -> ActorId {
    ActorId::new("officer_1").unwrap()
}

fn site() -> SiteId {
    SiteId::new("lot_a").unwrap()
}

struct Seed {
    vehicle: VehicleId,
    position: ParkingPositionId,
    observation: ObservationId,
}

fn seed(s: &mut EnforcementStore) -> Seed {
    let vehicle = s
        .resolve_vehicle_row(
            PlateKey::new("ABC123", "CA").unwrap(),
            VehicleDescription::default(),
            t(0),
            t(0),
        )
        .unwrap();
    let position = s
        .upsert_parking_position_row(
            None,
            ParkingPositionInput {
                site_id: site(),
                position_type: ParkingPositionType::Reserved,
                center: GeoPoint::new(47.6062, -122.3321).unwrap(),
                radius_m: 3.0,
                identifier: Some("R-7".to_string()),
                assigned_vehicle_id: None,
            },
            t(0),
        )
        .unwrap()
        .position_id;
    let observation = s
        .insert_observation_row(
            NewObservation {
                site_id: site(),
                vehicle_id: Some(vehicle),
                parking_position_id: Some(position),
                location: None,
                observed_at: t(0),
                registration: None,
                idempotency_key: "obs-1".to_string(),
                submitted_by: actor(),
            },
            vec![EvidenceInput {
                content: EvidenceContent::Photo {
                    storage_key: "uploads/front.jpg".to_string(),
                },
                intent: None,
            }],
            t(0),
        )
        .unwrap();
    Seed {
        vehicle,
        position,
        observation,
    }
}

fn new_violation(seed: &Seed) -> NewViolation {
    NewViolation {
        site_id: site(),
        vehicle_id: seed.vehicle,
        position_id: Some(seed.position),
        category: ViolationCategory::UnauthorizedStall,
        detected_at: t(0),
    }
}

fn event(violation_id: ViolationId, event_type: ViolationEventType, at: Timestamp) -> ViolationEventInput {
    ViolationEventInput {
        violation_id,
        event_type,
        observation_id: None,
        notice_id: None,
        notes: None,
        performed_by: actor(),
        created_at: at,
    }
}

#[test]
fn at_violation_db_01_open_writes_detected_event_and_index() {
    let mut s = EnforcementStore::new_in_memory();
    let seed = seed(&mut s);
    let v = s
        .open_violation_row(new_violation(&seed), seed.observation, None, actor(), t(0))
        .unwrap();

    let rec = s.violation_row(v).unwrap();
    assert_eq!(rec.status, ViolationStatus::Detected);
    let events = s.violation_event_rows_for(v);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ViolationEventType::Detected);
    assert_eq!(events[0].observation_id, Some(seed.observation));

    let key = OpenViolationKey::new(
        site(),
        seed.vehicle,
        Some(seed.position),
        ViolationCategory::UnauthorizedStall,
    );
    assert_eq!(s.open_violation_row_for_key(&key), Some(v));
}

#[test]
fn at_violation_db_02_open_tuple_is_unique_until_terminal() {
    let mut s = EnforcementStore::new_in_memory();
    let seed = seed(&mut s);
    let v = s
        .open_violation_row(new_violation(&seed), seed.observation, None, actor(), t(0))
        .unwrap();

    assert!(matches!(
        s.open_violation_row(new_violation(&seed), seed.observation, None, actor(), t(1)),
        Err(StorageError::DuplicateKey { .. })
    ));

    s.append_violation_event_row(event(v, ViolationEventType::Resolved, t(2)))
        .unwrap();
    assert_eq!(s.violation_row(v).unwrap().resolved_at, Some(t(2)));
    let again = s
        .open_violation_row(new_violation(&seed), seed.observation, None, actor(), t(3))
        .unwrap();
    assert_ne!(again, v);

    // Reopening the resolved one would now collide with the fresh violation.
    assert!(matches!(
        s.append_violation_event_row(event(v, ViolationEventType::Escalated, t(4))),
        Err(StorageError::DuplicateKey { .. })
    ));
    assert_eq!(s.violation_row(v).unwrap().status, ViolationStatus::Resolved);
    assert_eq!(s.violation_event_rows_for(v).len(), 2);
}

#[test]
fn at_violation_db_03_events_are_append_only_and_fk_checked() {
    let mut s = EnforcementStore::new_in_memory();
    let seed = seed(&mut s);
    let v = s
        .open_violation_row(new_violation(&seed), seed.observation, None, actor(), t(0))
        .unwrap();
    let first = s.violation_event_rows_for(v)[0].event_id;

    assert!(matches!(
        s.attempt_overwrite_violation_event_row(first),
        Err(StorageError::AppendOnlyViolation { .. })
    ));
    let mut dangling = event(v, ViolationEventType::ObservationAdded, t(1));
    dangling.observation_id = Some(ObservationId(404));
    assert!(matches!(
        s.append_violation_event_row(dangling),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    assert!(matches!(
        s.append_violation_event_row(event(ViolationId(99), ViolationEventType::Resolved, t(1))),
        Err(StorageError::NotFound { .. })
    ));
    assert_eq!(s.violation_event_rows_for(v).len(), 1);

    // The observation reference is optional; a bare OBSERVATION_ADDED links nothing.
    s.append_violation_event_row(event(v, ViolationEventType::ObservationAdded, t(1)))
        .unwrap();
    assert_eq!(s.violation_row(v).unwrap().status, ViolationStatus::Detected);
    assert_eq!(s.violation_event_rows_for(v).len(), 2);
    assert_eq!(s.linked_observation_rows(v), vec![seed.observation]);
}

#[test]
fn at_violation_db_04_missing_vehicle_is_fk_violation() {
    let mut s = EnforcementStore::new_in_memory();
    let seed = seed(&mut s);
    let mut new = new_violation(&seed);
    new.vehicle_id = VehicleId(999);
    assert!(matches!(
        s.open_violation_row(new, seed.observation, None, actor(), t(0)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
}

#[test]
fn at_violation_db_05_transaction_rolls_back_partial_ledger_writes() {
    let mut s = EnforcementStore::new_in_memory();
    let seed = seed(&mut s);
    let v = s
        .open_violation_row(new_violation(&seed), seed.observation, None, actor(), t(0))
        .unwrap();

    let out: Result<(), StorageError> = s.transaction(|s| {
        s.append_violation_event_row(event(v, ViolationEventType::NoticeEligible, t(1)))?;
        s.attempt_overwrite_violation_event_row(ViolationEventId(1))
    });
    assert!(out.is_err());
    assert_eq!(s.violation_row(v).unwrap().status, ViolationStatus::Detected);
    assert_eq!(s.violation_event_rows_for(v).len(), 1);
}

fn status_event() -> impl Strategy<Value = ViolationEventType> {
    prop::sample::select(vec![
        ViolationEventType::ObservationAdded,
        ViolationEventType::NoticeEligible,
        ViolationEventType::NoticeIssued,
        ViolationEventType::Escalated,
        ViolationEventType::TowEligible,
        ViolationEventType::Resolved,
        ViolationEventType::Dismissed,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn at_violation_db_06_rebuild_reproduces_incremental_projection(
        sequence in prop::collection::vec(status_event(), 0..16)
    ) {
        let mut s = EnforcementStore::new_in_memory();
        let seed = seed(&mut s);
        let v = s
            .open_violation_row(new_violation(&seed), seed.observation, None, actor(), t(0))
            .unwrap();
        for (i, event_type) in sequence.into_iter().enumerate() {
            let mut input = event(v, event_type, t(1 + i as i64));
            if event_type.links_observation() {
                input.observation_id = Some(seed.observation);
            }
            s.append_violation_event_row(input).unwrap();
        }

        let incremental = s.violation_row(v).unwrap().clone();
        let open_before = s.open_violation_rows().len();
        s.rebuild_violation_projection_rows();
        let rebuilt = s.violation_row(v).unwrap();
        prop_assert_eq!(rebuilt.status, incremental.status);
        prop_assert_eq!(rebuilt.resolved_at, incremental.resolved_at);
        prop_assert_eq!(rebuilt.dismissed_at, incremental.dismissed_at);
        prop_assert_eq!(&rebuilt.dismissal_reason, &incremental.dismissal_reason);
        prop_assert_eq!(s.open_violation_rows().len(), open_before);
    }
}
