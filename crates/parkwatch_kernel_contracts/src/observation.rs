#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_id, validate_text, ActorId, RowTimestamps, SiteId, SoftDelete, Timestamp};
use crate::position::{GeoPoint, ParkingPositionId};
use crate::vehicle::{VehicleDescription, VehicleId};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const OBSERVATION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const ACCESSIBLE_PLACARD_INTENT: &str = "accessible-placard-evidence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvidenceItemId(pub u64);

/// Capturing party's declared purpose for an evidence item. Never inferred.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvidenceIntent(String);

impl EvidenceIntent {
    pub fn new(tag: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(tag.into());
        v.validate()?;
        Ok(v)
    }

    pub fn accessible_placard() -> Self {
        Self(ACCESSIBLE_PLACARD_INTENT.to_string())
    }

    pub fn is_accessible_placard(&self) -> bool {
        self.0 == ACCESSIBLE_PLACARD_INTENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for EvidenceIntent {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("evidence_intent", &self.0, 64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceContent {
    /// Opaque object-storage key; the core never fetches the object.
    Photo { storage_key: String },
    Note { text: String },
}

impl Validate for EvidenceContent {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            EvidenceContent::Photo { storage_key } => {
                validate_id("evidence_content.storage_key", storage_key, 512)
            }
            EvidenceContent::Note { text } => validate_text("evidence_content.text", text, 4096),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceInput {
    pub content: EvidenceContent,
    pub intent: Option<EvidenceIntent>,
}

impl Validate for EvidenceInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.content.validate()?;
        if let Some(intent) = &self.intent {
            intent.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItemRecord {
    pub schema_version: SchemaVersion,
    pub evidence_id: EvidenceItemId,
    pub observation_id: ObservationId,
    pub content: EvidenceContent,
    pub intent: Option<EvidenceIntent>,
    pub rows: RowTimestamps,
}

impl EvidenceItemRecord {
    pub fn from_input_v1(
        evidence_id: EvidenceItemId,
        observation_id: ObservationId,
        input: EvidenceInput,
        now: Timestamp,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        Ok(Self {
            schema_version: OBSERVATION_CONTRACT_VERSION,
            evidence_id,
            observation_id,
            content: input.content,
            intent: input.intent,
            rows: RowTimestamps::new(now),
        })
    }

    pub fn is_accessible_placard(&self) -> bool {
        self.intent
            .as_ref()
            .map(EvidenceIntent::is_accessible_placard)
            .unwrap_or(false)
    }
}

impl SoftDelete for EvidenceItemRecord {
    fn deleted_at(&self) -> Option<Timestamp> {
        self.rows.deleted_at
    }
}

/// Registration sticker month/year as read at the encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPeriod {
    pub year: i32,
    pub month: u32,
}

impl RegistrationPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, ContractViolation> {
        let v = Self { year, month };
        v.validate()?;
        Ok(v)
    }
}

impl Validate for RegistrationPeriod {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !(1..=12).contains(&self.month) {
            return Err(ContractViolation::InvalidRange {
                field: "registration_period.month",
                min: 1.0,
                max: 12.0,
                got: self.month as f64,
            });
        }
        if !(1900..=9999).contains(&self.year) {
            return Err(ContractViolation::InvalidRange {
                field: "registration_period.year",
                min: 1900.0,
                max: 9999.0,
                got: self.year as f64,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSubmitRequest {
    pub site_id: SiteId,
    pub license_plate: Option<String>,
    pub issuing_state: Option<String>,
    #[serde(default)]
    pub vehicle_description: VehicleDescription,
    pub parking_position_id: Option<ParkingPositionId>,
    pub location: Option<GeoPoint>,
    pub observed_at: Timestamp,
    pub registration_month: Option<u32>,
    pub registration_year: Option<i32>,
    pub idempotency_key: String,
    pub evidence: Vec<EvidenceInput>,
}

impl ObservationSubmitRequest {
    pub fn registration(&self) -> Result<Option<RegistrationPeriod>, ContractViolation> {
        match (self.registration_year, self.registration_month) {
            (Some(year), Some(month)) => RegistrationPeriod::new(year, month).map(Some),
            (None, None) => Ok(None),
            _ => Err(ContractViolation::InvalidValue {
                field: "observation_submit_request.registration",
                reason: "registration month and year must be supplied together",
            }),
        }
    }

    /// `(plate, state)` when both are supplied.
    pub fn plate_and_state(&self) -> Result<Option<(&str, &str)>, ContractViolation> {
        match (self.license_plate.as_deref(), self.issuing_state.as_deref()) {
            (Some(p), Some(s)) => Ok(Some((p, s))),
            (None, None) => Ok(None),
            _ => Err(ContractViolation::InvalidValue {
                field: "observation_submit_request.license_plate",
                reason: "license plate and issuing state must be supplied together",
            }),
        }
    }
}

impl Validate for ObservationSubmitRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.site_id.validate()?;
        validate_id(
            "observation_submit_request.idempotency_key",
            &self.idempotency_key,
            128,
        )?;
        if self.evidence.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "observation_submit_request.evidence",
                reason: "at least one evidence item is required",
            });
        }
        for item in &self.evidence {
            item.validate()?;
        }
        self.plate_and_state()?;
        self.registration()?;
        self.vehicle_description.validate()?;
        if let Some(location) = &self.location {
            location.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationSubmitResult {
    pub observation_id: ObservationId,
    pub vehicle_id: Option<VehicleId>,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub schema_version: SchemaVersion,
    pub observation_id: ObservationId,
    pub site_id: SiteId,
    pub vehicle_id: Option<VehicleId>,
    pub parking_position_id: Option<ParkingPositionId>,
    pub location: Option<GeoPoint>,
    pub observed_at: Timestamp,
    pub registration: Option<RegistrationPeriod>,
    pub idempotency_key: String,
    pub submitted_by: ActorId,
    pub rows: RowTimestamps,
}

impl SoftDelete for ObservationRecord {
    fn deleted_at(&self) -> Option<Timestamp> {
        self.rows.deleted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn request() -> ObservationSubmitRequest {
        ObservationSubmitRequest {
            site_id: SiteId::new("lot_a").unwrap(),
            license_plate: Some("ABC123".to_string()),
            issuing_state: Some("CA".to_string()),
            vehicle_description: VehicleDescription::default(),
            parking_position_id: None,
            location: None,
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            registration_month: None,
            registration_year: None,
            idempotency_key: "obs-1".to_string(),
            evidence: vec![EvidenceInput {
                content: EvidenceContent::Note {
                    text: "parked across two stalls".to_string(),
                },
                intent: None,
            }],
        }
    }

    #[test]
    fn empty_evidence_is_rejected() {
        let mut r = request();
        r.evidence.clear();
        assert_eq!(
            r.validate(),
            Err(ContractViolation::InvalidValue {
                field: "observation_submit_request.evidence",
                reason: "at least one evidence item is required",
            })
        );
    }

    #[test]
    fn half_supplied_registration_and_plate_are_rejected() {
        let mut r = request();
        r.registration_month = Some(4);
        assert!(r.validate().is_err());

        let mut r = request();
        r.issuing_state = None;
        assert!(r.validate().is_err());

        let mut r = request();
        r.registration_month = Some(13);
        r.registration_year = Some(2026);
        assert!(r.validate().is_err());
    }

    #[test]
    fn placard_intent_is_recognized() {
        assert!(EvidenceIntent::accessible_placard().is_accessible_placard());
        assert!(!EvidenceIntent::new("plate-capture")
            .unwrap()
            .is_accessible_placard());
    }
}
