#![forbid(unsafe_code)]

use chrono::{Duration, TimeZone, Utc};
use parkwatch_kernel_contracts::vehicle::{PlateKey, VehicleDescription};
use parkwatch_kernel_contracts::Timestamp;
use parkwatch_storage::repo::VehicleRepo;
use parkwatch_storage::{EnforcementStore, StorageError};

fn t(hours: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::hours(hours)
}

fn plate(p: &str, s: &str) -> PlateKey {
    PlateKey::new(p, s).unwrap()
}

#[test]
fn at_vehicle_db_01_first_sighting_creates_repeat_sighting_reuses() {
    let mut s = EnforcementStore::new_in_memory();

    let a = s
        .resolve_vehicle_row(plate("abc-123", "ca"), VehicleDescription::default(), t(0), t(0))
        .unwrap();
    let b = s
        .resolve_vehicle_row(plate("ABC 123", "CA"), VehicleDescription::default(), t(2), t(2))
        .unwrap();
    assert_eq!(a, b);

    let other = s
        .resolve_vehicle_row(plate("ABC123", "WA"), VehicleDescription::default(), t(2), t(2))
        .unwrap();
    assert_ne!(a, other);

    let row = s.vehicle_row(a).unwrap();
    assert_eq!(row.last_observed_at, t(2));
    assert_eq!(row.rows.created_at, t(0));
}

#[test]
fn at_vehicle_db_02_last_observed_never_moves_backwards() {
    let mut s = EnforcementStore::new_in_memory();
    let id = s
        .resolve_vehicle_row(plate("XYZ789", "WA"), VehicleDescription::default(), t(5), t(5))
        .unwrap();
    s.resolve_vehicle_row(plate("XYZ789", "WA"), VehicleDescription::default(), t(1), t(6))
        .unwrap();
    assert_eq!(s.vehicle_row(id).unwrap().last_observed_at, t(5));
}

#[test]
fn at_vehicle_db_03_soft_deleted_vehicle_is_hidden_and_not_reused() {
    let mut s = EnforcementStore::new_in_memory();
    let id = s
        .resolve_vehicle_row(plate("DEF456", "OR"), VehicleDescription::default(), t(0), t(0))
        .unwrap();
    s.soft_delete_vehicle_row(id, t(1)).unwrap();

    assert!(s.vehicle_row(id).is_none());
    assert!(s.vehicle_row_by_plate(&plate("DEF456", "OR")).is_none());
    assert!(matches!(
        s.soft_delete_vehicle_row(id, t(2)),
        Err(StorageError::NotFound { .. })
    ));

    let fresh = s
        .resolve_vehicle_row(plate("DEF456", "OR"), VehicleDescription::default(), t(3), t(3))
        .unwrap();
    assert_ne!(fresh, id);
}
