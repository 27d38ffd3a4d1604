#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_optional_text, RowTimestamps, SiteId, SoftDelete, Timestamp};
use crate::vehicle::VehicleId;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const PARKING_POSITION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

const EARTH_RADIUS_M: f64 = 6_371_008.8;
const MAX_POSITION_RADIUS_M: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParkingPositionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParkingPositionType {
    Open,
    Handicapped,
    Purchased,
    Reserved,
}

impl ParkingPositionType {
    /// Stall types that are bound to an assigned vehicle.
    pub fn is_assigned_stall(self) -> bool {
        matches!(
            self,
            ParkingPositionType::Purchased | ParkingPositionType::Reserved
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParkingPositionType::Open => "open",
            ParkingPositionType::Handicapped => "handicapped",
            ParkingPositionType::Purchased => "purchased",
            ParkingPositionType::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, ContractViolation> {
        let p = Self { lat, lon };
        p.validate()?;
        Ok(p)
    }

    /// Great-circle (haversine) distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

impl Validate for GeoPoint {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.lat.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "geo_point.lat",
            });
        }
        if !self.lon.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "geo_point.lon",
            });
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lat",
                min: -90.0,
                max: 90.0,
                got: self.lat,
            });
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lon",
                min: -180.0,
                max: 180.0,
                got: self.lon,
            });
        }
        Ok(())
    }
}

/// Administrative create/edit payload for a stall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingPositionInput {
    pub site_id: SiteId,
    pub position_type: ParkingPositionType,
    pub center: GeoPoint,
    pub radius_m: f64,
    pub identifier: Option<String>,
    pub assigned_vehicle_id: Option<VehicleId>,
}

impl Validate for ParkingPositionInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.site_id.validate()?;
        self.center.validate()?;
        validate_radius(self.radius_m)?;
        validate_optional_text(
            "parking_position_input.identifier",
            self.identifier.as_deref(),
            64,
        )?;
        if self.assigned_vehicle_id.is_some() && !self.position_type.is_assigned_stall() {
            return Err(ContractViolation::InvalidValue {
                field: "parking_position_input.assigned_vehicle_id",
                reason: "only purchased or reserved stalls carry an assigned vehicle",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingPositionRecord {
    pub schema_version: SchemaVersion,
    pub position_id: ParkingPositionId,
    pub site_id: SiteId,
    pub position_type: ParkingPositionType,
    pub center: GeoPoint,
    pub radius_m: f64,
    pub identifier: Option<String>,
    pub assigned_vehicle_id: Option<VehicleId>,
    pub rows: RowTimestamps,
}

impl ParkingPositionRecord {
    pub fn from_input_v1(
        position_id: ParkingPositionId,
        input: ParkingPositionInput,
        now: Timestamp,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        Ok(Self {
            schema_version: PARKING_POSITION_CONTRACT_VERSION,
            position_id,
            site_id: input.site_id,
            position_type: input.position_type,
            center: input.center,
            radius_m: input.radius_m,
            identifier: input.identifier,
            assigned_vehicle_id: input.assigned_vehicle_id,
            rows: RowTimestamps::new(now),
        })
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_m(point) <= self.radius_m
    }
}

impl SoftDelete for ParkingPositionRecord {
    fn deleted_at(&self) -> Option<Timestamp> {
        self.rows.deleted_at
    }
}

fn validate_radius(radius_m: f64) -> Result<(), ContractViolation> {
    if !radius_m.is_finite() {
        return Err(ContractViolation::NotFinite {
            field: "parking_position.radius_m",
        });
    }
    if radius_m <= 0.0 || radius_m > MAX_POSITION_RADIUS_M {
        return Err(ContractViolation::InvalidRange {
            field: "parking_position.radius_m",
            min: 0.0,
            max: MAX_POSITION_RADIUS_M,
            got: radius_m,
        });
    }
    Ok(())
}
