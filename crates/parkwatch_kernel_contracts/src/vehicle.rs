#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_optional_text, RowTimestamps, SoftDelete, Timestamp};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const VEHICLE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u64);

/// Durable vehicle identity: normalized (plate, issuing state).
///
/// Plates lose whitespace and hyphens and are uppercased, so `"abc-123"` and
/// `"ABC 123"` resolve to the same vehicle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlateKey {
    plate: String,
    state: String,
}

impl PlateKey {
    pub fn new(plate: &str, state: &str) -> Result<Self, ContractViolation> {
        let plate: String = plate
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let state = state.trim().to_ascii_uppercase();
        let key = Self { plate, state };
        key.validate()?;
        Ok(key)
    }

    pub fn plate(&self) -> &str {
        &self.plate
    }

    pub fn state(&self) -> &str {
        &self.state
    }
}

impl Validate for PlateKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.plate.is_empty() || self.plate.len() > 16 {
            return Err(ContractViolation::InvalidValue {
                field: "plate_key.plate",
                reason: "must be 1..=16 chars after normalization",
            });
        }
        if !self.plate.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ContractViolation::InvalidValue {
                field: "plate_key.plate",
                reason: "must be ASCII alphanumeric",
            });
        }
        if self.state.is_empty() || self.state.len() > 8 {
            return Err(ContractViolation::InvalidValue {
                field: "plate_key.state",
                reason: "must be 1..=8 chars",
            });
        }
        if !self.state.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ContractViolation::InvalidValue {
                field: "plate_key.state",
                reason: "must be ASCII alphanumeric",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDescription {
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
}

impl Validate for VehicleDescription {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_optional_text("vehicle_description.make", self.make.as_deref(), 64)?;
        validate_optional_text("vehicle_description.model", self.model.as_deref(), 64)?;
        validate_optional_text("vehicle_description.color", self.color.as_deref(), 32)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub schema_version: SchemaVersion,
    pub vehicle_id: VehicleId,
    pub plate_key: PlateKey,
    pub description: VehicleDescription,
    pub last_observed_at: Timestamp,
    pub rows: RowTimestamps,
}

impl VehicleRecord {
    pub fn v1(
        vehicle_id: VehicleId,
        plate_key: PlateKey,
        description: VehicleDescription,
        observed_at: Timestamp,
        now: Timestamp,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: VEHICLE_CONTRACT_VERSION,
            vehicle_id,
            plate_key,
            description,
            last_observed_at: observed_at,
            rows: RowTimestamps::new(now),
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for VehicleRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != VEHICLE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "vehicle_record.schema_version",
                reason: "must match VEHICLE_CONTRACT_VERSION",
            });
        }
        self.plate_key.validate()?;
        self.description.validate()
    }
}

impl SoftDelete for VehicleRecord {
    fn deleted_at(&self) -> Option<Timestamp> {
        self.rows.deleted_at
    }
}
