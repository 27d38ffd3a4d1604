#![forbid(unsafe_code)]

use chrono::{Duration, TimeZone, Utc};
use parkwatch_kernel_contracts::notice::{AccessToken, StoredNoticePayload};
use parkwatch_kernel_contracts::observation::{EvidenceContent, EvidenceInput};
use parkwatch_kernel_contracts::vehicle::{PlateKey, VehicleDescription};
use parkwatch_kernel_contracts::violation::{ViolationCategory, ViolationId};
use parkwatch_kernel_contracts::{ActorId, SchemaVersion, SiteId, Timestamp};
use parkwatch_storage::repo::{NoticeRepo, ObservationRepo, VehicleRepo, ViolationLedgerRepo};
use parkwatch_storage::{EnforcementStore, NewNotice, NewObservation, NewViolation, StorageError};

fn t(hours: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::hours(hours)
}

fn actor() -> ActorId {
    ActorId::new("officer_1").unwrap()
}

fn seed_violation(s: &mut EnforcementStore) -> ViolationId {
    let site = SiteId::new("lot_a").unwrap();
    let vehicle = s
        .resolve_vehicle_row(
            PlateKey::new("ABC123", "CA").unwrap(),
            VehicleDescription::default(),
            t(0),
            t(0),
        )
        .unwrap();
    let obs = s
        .insert_observation_row(
            NewObservation {
                site_id: site.clone(),
                vehicle_id: Some(vehicle),
                parking_position_id: None,
                location: None,
                observed_at: t(0),
                registration: None,
                idempotency_key: "obs-1".to_string(),
                submitted_by: actor(),
            },
            vec![EvidenceInput {
                content: EvidenceContent::Note {
                    text: "sticker expired".to_string(),
                },
                intent: None,
            }],
            t(0),
        )
        .unwrap();
    s.open_violation_row(
        NewViolation {
            site_id: site,
            vehicle_id: vehicle,
            position_id: None,
            category: ViolationCategory::ExpiredRegistration,
            detected_at: t(0),
        },
        obs,
        None,
        actor(),
        t(0),
    )
    .unwrap()
}

fn new_notice(violation_id: ViolationId, key: &str, token: &str) -> NewNotice {
    NewNotice {
        violation_id,
        idempotency_key: key.to_string(),
        issued_by: actor(),
        access_token: AccessToken::new(token).unwrap(),
        payload: StoredNoticePayload {
            schema_version: SchemaVersion(1),
            body_json: "{}".to_string(),
            body_sha256_hex: "00".to_string(),
        },
    }
}

#[test]
fn at_notice_db_01_idempotency_key_and_token_are_unique() {
    let mut s = EnforcementStore::new_in_memory();
    let v = seed_violation(&mut s);

    let n = s
        .insert_notice_row(new_notice(v, "notice-1", "tok_aaaaaaaaaaaaaaaa"), t(1))
        .unwrap();
    assert_eq!(
        s.notice_row_for_idempotency_key("notice-1").unwrap().notice_id,
        n.notice_id
    );

    assert!(matches!(
        s.insert_notice_row(new_notice(v, "notice-1", "tok_bbbbbbbbbbbbbbbb"), t(2)),
        Err(StorageError::DuplicateKey { .. })
    ));
    assert!(matches!(
        s.insert_notice_row(new_notice(v, "notice-2", "tok_aaaaaaaaaaaaaaaa"), t(2)),
        Err(StorageError::DuplicateKey { .. })
    ));
    assert!(matches!(
        s.insert_notice_row(new_notice(ViolationId(77), "notice-3", "tok_cccccccccccccccc"), t(2)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
}

#[test]
fn at_notice_db_02_mark_printed_sets_once() {
    let mut s = EnforcementStore::new_in_memory();
    let v = seed_violation(&mut s);
    let n = s
        .insert_notice_row(new_notice(v, "notice-1", "tok_aaaaaaaaaaaaaaaa"), t(1))
        .unwrap();

    let first = s.mark_notice_printed_row(n.notice_id, t(2)).unwrap();
    let second = s.mark_notice_printed_row(n.notice_id, t(3)).unwrap();
    assert_eq!(first.printed_at, Some(t(2)));
    assert_eq!(second.printed_at, Some(t(2)));
}

#[test]
fn at_notice_db_03_soft_deleted_notice_is_not_found() {
    let mut s = EnforcementStore::new_in_memory();
    let v = seed_violation(&mut s);
    let n = s
        .insert_notice_row(new_notice(v, "notice-1", "tok_aaaaaaaaaaaaaaaa"), t(1))
        .unwrap();
    s.soft_delete_notice_row(n.notice_id, t(2)).unwrap();

    assert!(s.notice_row(n.notice_id).is_none());
    assert!(s
        .notice_row_by_access_token(&AccessToken::new("tok_aaaaaaaaaaaaaaaa").unwrap())
        .is_none());
    assert!(matches!(
        s.mark_notice_printed_row(n.notice_id, t(3)),
        Err(StorageError::NotFound { .. })
    ));
}
