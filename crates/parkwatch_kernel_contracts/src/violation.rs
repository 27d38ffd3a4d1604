#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_optional_text, ActorId, RowTimestamps, SiteId, SoftDelete, Timestamp};
use crate::notice::NoticeId;
use crate::observation::ObservationId;
use crate::position::ParkingPositionId;
use crate::vehicle::VehicleId;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const VIOLATION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Reason recorded on a DISMISSED event when the caller supplies none.
pub const DEFAULT_DISMISSAL_REASON: &str = "Dismissed by administrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViolationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViolationEventId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCategory {
    FireLane,
    AccessibleNoPlacard,
    UnauthorizedStall,
    ExpiredRegistration,
    NoParkingZone,
}

impl ViolationCategory {
    pub const ALL: [ViolationCategory; 5] = [
        ViolationCategory::FireLane,
        ViolationCategory::AccessibleNoPlacard,
        ViolationCategory::UnauthorizedStall,
        ViolationCategory::ExpiredRegistration,
        ViolationCategory::NoParkingZone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationCategory::FireLane => "FIRE_LANE",
            ViolationCategory::AccessibleNoPlacard => "ACCESSIBLE_NO_PLACARD",
            ViolationCategory::UnauthorizedStall => "UNAUTHORIZED_STALL",
            ViolationCategory::ExpiredRegistration => "EXPIRED_REGISTRATION",
            ViolationCategory::NoParkingZone => "NO_PARKING_ZONE",
        }
    }

    /// Expired registration follows the vehicle, not the stall.
    pub fn is_position_scoped(self) -> bool {
        !matches!(self, ViolationCategory::ExpiredRegistration)
    }

    /// Categories that later evidence can retroactively resolve.
    pub fn is_evidence_sensitive(self) -> bool {
        matches!(self, ViolationCategory::AccessibleNoPlacard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationStatus {
    Detected,
    NoticeEligible,
    NoticeIssued,
    Escalated,
    TowEligible,
    Resolved,
    Dismissed,
}

impl ViolationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ViolationStatus::Resolved | ViolationStatus::Dismissed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationStatus::Detected => "DETECTED",
            ViolationStatus::NoticeEligible => "NOTICE_ELIGIBLE",
            ViolationStatus::NoticeIssued => "NOTICE_ISSUED",
            ViolationStatus::Escalated => "ESCALATED",
            ViolationStatus::TowEligible => "TOW_ELIGIBLE",
            ViolationStatus::Resolved => "RESOLVED",
            ViolationStatus::Dismissed => "DISMISSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationEventType {
    Detected,
    ObservationAdded,
    NoticeEligible,
    NoticeIssued,
    Escalated,
    TowEligible,
    Resolved,
    Dismissed,
}

impl ViolationEventType {
    pub const ALL: [ViolationEventType; 8] = [
        ViolationEventType::Detected,
        ViolationEventType::ObservationAdded,
        ViolationEventType::NoticeEligible,
        ViolationEventType::NoticeIssued,
        ViolationEventType::Escalated,
        ViolationEventType::TowEligible,
        ViolationEventType::Resolved,
        ViolationEventType::Dismissed,
    ];

    /// Fixed event → status mapping. `None` means the event leaves status alone.
    pub fn implied_status(self) -> Option<ViolationStatus> {
        match self {
            ViolationEventType::Detected => Some(ViolationStatus::Detected),
            ViolationEventType::ObservationAdded => None,
            ViolationEventType::NoticeEligible => Some(ViolationStatus::NoticeEligible),
            ViolationEventType::NoticeIssued => Some(ViolationStatus::NoticeIssued),
            ViolationEventType::Escalated => Some(ViolationStatus::Escalated),
            ViolationEventType::TowEligible => Some(ViolationStatus::TowEligible),
            ViolationEventType::Resolved => Some(ViolationStatus::Resolved),
            ViolationEventType::Dismissed => Some(ViolationStatus::Dismissed),
        }
    }

    /// Events through which an observation becomes linked to a violation, when
    /// they carry one. The reference itself stays optional.
    pub fn links_observation(self) -> bool {
        matches!(
            self,
            ViolationEventType::Detected | ViolationEventType::ObservationAdded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationEventType::Detected => "DETECTED",
            ViolationEventType::ObservationAdded => "OBSERVATION_ADDED",
            ViolationEventType::NoticeEligible => "NOTICE_ELIGIBLE",
            ViolationEventType::NoticeIssued => "NOTICE_ISSUED",
            ViolationEventType::Escalated => "ESCALATED",
            ViolationEventType::TowEligible => "TOW_ELIGIBLE",
            ViolationEventType::Resolved => "RESOLVED",
            ViolationEventType::Dismissed => "DISMISSED",
        }
    }
}

/// Uniqueness tuple for non-terminal violations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpenViolationKey {
    pub site_id: SiteId,
    pub vehicle_id: VehicleId,
    pub position_id: Option<ParkingPositionId>,
    pub category: ViolationCategory,
}

impl OpenViolationKey {
    /// Drops the position for categories that are not position-scoped.
    pub fn new(
        site_id: SiteId,
        vehicle_id: VehicleId,
        position_id: Option<ParkingPositionId>,
        category: ViolationCategory,
    ) -> Self {
        let position_id = if category.is_position_scoped() {
            position_id
        } else {
            None
        };
        Self {
            site_id,
            vehicle_id,
            position_id,
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEventInput {
    pub violation_id: ViolationId,
    pub event_type: ViolationEventType,
    pub observation_id: Option<ObservationId>,
    pub notice_id: Option<NoticeId>,
    pub notes: Option<String>,
    pub performed_by: ActorId,
    pub created_at: Timestamp,
}

impl Validate for ViolationEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.performed_by.validate()?;
        validate_optional_text("violation_event_input.notes", self.notes.as_deref(), 2048)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub schema_version: SchemaVersion,
    pub event_id: ViolationEventId,
    pub violation_id: ViolationId,
    pub event_type: ViolationEventType,
    pub observation_id: Option<ObservationId>,
    pub notice_id: Option<NoticeId>,
    pub notes: Option<String>,
    pub performed_by: ActorId,
    pub created_at: Timestamp,
}

impl ViolationEvent {
    pub fn from_input_v1(
        event_id: ViolationEventId,
        input: ViolationEventInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        Ok(Self {
            schema_version: VIOLATION_CONTRACT_VERSION,
            event_id,
            violation_id: input.violation_id,
            event_type: input.event_type,
            observation_id: input.observation_id,
            notice_id: input.notice_id,
            notes: input.notes,
            performed_by: input.performed_by,
            created_at: input.created_at,
        })
    }
}

/// Status-bearing fields of a violation, derived only from its events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationProjection {
    pub status: ViolationStatus,
    pub resolved_at: Option<Timestamp>,
    pub dismissed_at: Option<Timestamp>,
    pub dismissal_reason: Option<String>,
    pub last_status_event_id: ViolationEventId,
}

impl ViolationProjection {
    /// Folds events in the order given. Returns `None` until a status-changing event appears.
    pub fn fold<'a, I>(events: I) -> Option<ViolationProjection>
    where
        I: IntoIterator<Item = &'a ViolationEvent>,
    {
        events.into_iter().fold(None, |acc, ev| {
            let Some(status) = ev.event_type.implied_status() else {
                return acc;
            };
            let (resolved_at, dismissed_at, dismissal_reason) = match status {
                ViolationStatus::Resolved => (Some(ev.created_at), None, None),
                ViolationStatus::Dismissed => (
                    None,
                    Some(ev.created_at),
                    Some(
                        ev.notes
                            .clone()
                            .unwrap_or_else(|| DEFAULT_DISMISSAL_REASON.to_string()),
                    ),
                ),
                _ => (None, None, None),
            };
            Some(ViolationProjection {
                status,
                resolved_at,
                dismissed_at,
                dismissal_reason,
                last_status_event_id: ev.event_id,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub schema_version: SchemaVersion,
    pub violation_id: ViolationId,
    pub site_id: SiteId,
    pub vehicle_id: VehicleId,
    pub position_id: Option<ParkingPositionId>,
    pub category: ViolationCategory,
    pub detected_at: Timestamp,
    pub status: ViolationStatus,
    pub resolved_at: Option<Timestamp>,
    pub dismissed_at: Option<Timestamp>,
    pub dismissal_reason: Option<String>,
    pub rows: RowTimestamps,
}

impl ViolationRecord {
    pub fn open_key(&self) -> OpenViolationKey {
        OpenViolationKey::new(
            self.site_id.clone(),
            self.vehicle_id,
            self.position_id,
            self.category,
        )
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

impl SoftDelete for ViolationRecord {
    fn deleted_at(&self) -> Option<Timestamp> {
        self.rows.deleted_at
    }
}
