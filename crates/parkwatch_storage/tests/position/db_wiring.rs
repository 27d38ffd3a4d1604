#![forbid(unsafe_code)]

use chrono::{Duration, TimeZone, Utc};
use parkwatch_kernel_contracts::position::{
    GeoPoint, ParkingPositionInput, ParkingPositionType,
};
use parkwatch_kernel_contracts::vehicle::VehicleId;
use parkwatch_kernel_contracts::{SiteId, Timestamp};
use parkwatch_storage::repo::ParkingPositionRepo;
use parkwatch_storage::{EnforcementStore, StorageError};

fn t(hours: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::hours(hours)
}

fn site() -> SiteId {
    SiteId::new("lot_a").unwrap()
}

fn input(position_type: ParkingPositionType, lat: f64, radius_m: f64) -> ParkingPositionInput {
    ParkingPositionInput {
        site_id: site(),
        position_type,
        center: GeoPoint::new(lat, -122.0).unwrap(),
        radius_m,
        identifier: None,
        assigned_vehicle_id: None,
    }
}

#[test]
fn at_position_db_01_locate_prefers_tightest_containing_circle() {
    let mut s = EnforcementStore::new_in_memory();
    let wide = s
        .upsert_parking_position_row(None, input(ParkingPositionType::Open, 47.0, 50.0), t(0))
        .unwrap();
    let tight = s
        .upsert_parking_position_row(
            None,
            input(ParkingPositionType::Handicapped, 47.0, 3.0),
            t(0),
        )
        .unwrap();

    let here = GeoPoint::new(47.0, -122.0).unwrap();
    assert_eq!(
        s.locate_position_row(&site(), &here).unwrap().position_id,
        tight.position_id
    );

    // Roughly 22 m north: outside the 3 m stall, inside the 50 m lot.
    let north = GeoPoint::new(47.0002, -122.0).unwrap();
    assert_eq!(
        s.locate_position_row(&site(), &north).unwrap().position_id,
        wide.position_id
    );

    let other_site = SiteId::new("lot_b").unwrap();
    assert!(s.locate_position_row(&other_site, &here).is_none());
}

#[test]
fn at_position_db_02_edit_keeps_created_at_and_bumps_updated_at() {
    let mut s = EnforcementStore::new_in_memory();
    let p = s
        .upsert_parking_position_row(None, input(ParkingPositionType::Open, 47.0, 3.0), t(0))
        .unwrap();
    let edited = s
        .upsert_parking_position_row(
            Some(p.position_id),
            input(ParkingPositionType::Reserved, 47.0, 3.0),
            t(4),
        )
        .unwrap();
    assert_eq!(edited.position_id, p.position_id);
    assert_eq!(edited.position_type, ParkingPositionType::Reserved);
    assert_eq!(edited.rows.created_at, t(0));
    assert_eq!(edited.rows.updated_at, t(4));
}

#[test]
fn at_position_db_03_assigned_vehicle_must_exist() {
    let mut s = EnforcementStore::new_in_memory();
    let mut i = input(ParkingPositionType::Purchased, 47.0, 3.0);
    i.assigned_vehicle_id = Some(VehicleId(99));
    assert!(matches!(
        s.upsert_parking_position_row(None, i, t(0)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
}

#[test]
fn at_position_db_04_soft_deleted_position_is_not_located() {
    let mut s = EnforcementStore::new_in_memory();
    let p = s
        .upsert_parking_position_row(None, input(ParkingPositionType::Open, 47.0, 3.0), t(0))
        .unwrap();
    s.soft_delete_parking_position_row(p.position_id, t(1)).unwrap();

    let here = GeoPoint::new(47.0, -122.0).unwrap();
    assert!(s.locate_position_row(&site(), &here).is_none());
    assert!(s.parking_position_row(p.position_id).is_none());
    assert!(matches!(
        s.upsert_parking_position_row(
            Some(p.position_id),
            input(ParkingPositionType::Open, 47.0, 3.0),
            t(2)
        ),
        Err(StorageError::NotFound { .. })
    ));
}
