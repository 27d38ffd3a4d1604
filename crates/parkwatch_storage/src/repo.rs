#![forbid(unsafe_code)]

use parkwatch_kernel_contracts::notice::{AccessToken, NoticeId, NoticeRecord};
use parkwatch_kernel_contracts::observation::{
    EvidenceInput, EvidenceItemId, EvidenceItemRecord, ObservationId, ObservationRecord,
};
use parkwatch_kernel_contracts::position::{
    GeoPoint, ParkingPositionId, ParkingPositionInput, ParkingPositionRecord,
};
use parkwatch_kernel_contracts::vehicle::{PlateKey, VehicleDescription, VehicleId, VehicleRecord};
use parkwatch_kernel_contracts::violation::{
    OpenViolationKey, ViolationCategory, ViolationEvent, ViolationEventId, ViolationEventInput,
    ViolationId, ViolationRecord,
};
use parkwatch_kernel_contracts::{ActorId, SiteId, Timestamp};

use crate::store::{EnforcementStore, NewNotice, NewObservation, NewViolation, StorageError};

/// Typed repository interface for `vehicles`.
pub trait VehicleRepo {
    fn resolve_vehicle_row(
        &mut self,
        plate_key: PlateKey,
        description: VehicleDescription,
        observed_at: Timestamp,
        now: Timestamp,
    ) -> Result<VehicleId, StorageError>;
    fn vehicle_row(&self, vehicle_id: VehicleId) -> Option<&VehicleRecord>;
    fn vehicle_row_by_plate(&self, plate_key: &PlateKey) -> Option<&VehicleRecord>;
    fn soft_delete_vehicle_row(
        &mut self,
        vehicle_id: VehicleId,
        now: Timestamp,
    ) -> Result<(), StorageError>;
}

/// Typed repository interface for `parking_positions`.
pub trait ParkingPositionRepo {
    fn upsert_parking_position_row(
        &mut self,
        position_id: Option<ParkingPositionId>,
        input: ParkingPositionInput,
        now: Timestamp,
    ) -> Result<ParkingPositionRecord, StorageError>;
    fn parking_position_row(&self, position_id: ParkingPositionId)
        -> Option<&ParkingPositionRecord>;
    fn locate_position_row(&self, site_id: &SiteId, point: &GeoPoint)
        -> Option<&ParkingPositionRecord>;
    fn parking_position_rows_for_site(&self, site_id: &SiteId) -> Vec<&ParkingPositionRecord>;
    fn soft_delete_parking_position_row(
        &mut self,
        position_id: ParkingPositionId,
        now: Timestamp,
    ) -> Result<(), StorageError>;
}

/// Typed repository interface for `observations` + `evidence_items` (immutable facts).
pub trait ObservationRepo {
    fn insert_observation_row(
        &mut self,
        new: NewObservation,
        evidence: Vec<EvidenceInput>,
        now: Timestamp,
    ) -> Result<ObservationId, StorageError>;
    fn observation_row(&self, observation_id: ObservationId) -> Option<&ObservationRecord>;
    fn observation_row_for_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Option<(ObservationId, Option<VehicleId>)>;
    fn evidence_rows(&self, observation_id: ObservationId) -> Vec<&EvidenceItemRecord>;
    fn observation_has_placard_row(&self, observation_id: ObservationId) -> bool;
    fn attempt_overwrite_observation_row(
        &mut self,
        observation_id: ObservationId,
    ) -> Result<(), StorageError>;
    fn attempt_overwrite_evidence_row(
        &mut self,
        evidence_id: EvidenceItemId,
    ) -> Result<(), StorageError>;
    fn soft_delete_observation_row(
        &mut self,
        observation_id: ObservationId,
        now: Timestamp,
    ) -> Result<(), StorageError>;
}

/// Typed repository interface for `violations` + append-only `violation_events`.
pub trait ViolationLedgerRepo {
    fn open_violation_row(
        &mut self,
        new: NewViolation,
        observation_id: ObservationId,
        notes: Option<String>,
        performed_by: ActorId,
        now: Timestamp,
    ) -> Result<ViolationId, StorageError>;
    fn append_violation_event_row(
        &mut self,
        input: ViolationEventInput,
    ) -> Result<ViolationEvent, StorageError>;
    fn violation_row(&self, violation_id: ViolationId) -> Option<&ViolationRecord>;
    fn open_violation_row_for_key(&self, key: &OpenViolationKey) -> Option<ViolationId>;
    fn open_violation_rows(&self) -> Vec<&ViolationRecord>;
    fn open_violation_rows_for_vehicle(
        &self,
        vehicle_id: VehicleId,
        category: ViolationCategory,
    ) -> Vec<&ViolationRecord>;
    fn violation_event_rows_for(&self, violation_id: ViolationId) -> Vec<&ViolationEvent>;
    fn linked_observation_rows(&self, violation_id: ViolationId) -> Vec<ObservationId>;
    fn attempt_overwrite_violation_event_row(
        &mut self,
        event_id: ViolationEventId,
    ) -> Result<(), StorageError>;
    fn rebuild_violation_projection_rows(&mut self);
}

/// Typed repository interface for `notices`.
pub trait NoticeRepo {
    fn insert_notice_row(
        &mut self,
        new: NewNotice,
        now: Timestamp,
    ) -> Result<NoticeRecord, StorageError>;
    fn notice_row(&self, notice_id: NoticeId) -> Option<&NoticeRecord>;
    fn notice_row_for_idempotency_key(&self, idempotency_key: &str) -> Option<&NoticeRecord>;
    fn notice_row_by_access_token(&self, token: &AccessToken) -> Option<&NoticeRecord>;
    fn access_token_row_in_use(&self, token: &AccessToken) -> bool;
    fn notice_rows_for_violation(&self, violation_id: ViolationId) -> Vec<&NoticeRecord>;
    fn mark_notice_printed_row(
        &mut self,
        notice_id: NoticeId,
        now: Timestamp,
    ) -> Result<NoticeRecord, StorageError>;
    fn soft_delete_notice_row(
        &mut self,
        notice_id: NoticeId,
        now: Timestamp,
    ) -> Result<(), StorageError>;
}

impl VehicleRepo for EnforcementStore {
    fn resolve_vehicle_row(
        &mut self,
        plate_key: PlateKey,
        description: VehicleDescription,
        observed_at: Timestamp,
        now: Timestamp,
    ) -> Result<VehicleId, StorageError> {
        self.resolve_vehicle(plate_key, description, observed_at, now)
    }

    fn vehicle_row(&self, vehicle_id: VehicleId) -> Option<&VehicleRecord> {
        self.vehicle(vehicle_id)
    }

    fn vehicle_row_by_plate(&self, plate_key: &PlateKey) -> Option<&VehicleRecord> {
        self.vehicle_by_plate(plate_key)
    }

    fn soft_delete_vehicle_row(
        &mut self,
        vehicle_id: VehicleId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        self.soft_delete_vehicle(vehicle_id, now)
    }
}

impl ParkingPositionRepo for EnforcementStore {
    fn upsert_parking_position_row(
        &mut self,
        position_id: Option<ParkingPositionId>,
        input: ParkingPositionInput,
        now: Timestamp,
    ) -> Result<ParkingPositionRecord, StorageError> {
        self.upsert_parking_position(position_id, input, now)
    }

    fn parking_position_row(
        &self,
        position_id: ParkingPositionId,
    ) -> Option<&ParkingPositionRecord> {
        self.parking_position(position_id)
    }

    fn locate_position_row(
        &self,
        site_id: &SiteId,
        point: &GeoPoint,
    ) -> Option<&ParkingPositionRecord> {
        self.locate_position(site_id, point)
    }

    fn parking_position_rows_for_site(&self, site_id: &SiteId) -> Vec<&ParkingPositionRecord> {
        self.parking_positions_for_site(site_id)
    }

    fn soft_delete_parking_position_row(
        &mut self,
        position_id: ParkingPositionId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        self.soft_delete_parking_position(position_id, now)
    }
}

impl ObservationRepo for EnforcementStore {
    fn insert_observation_row(
        &mut self,
        new: NewObservation,
        evidence: Vec<EvidenceInput>,
        now: Timestamp,
    ) -> Result<ObservationId, StorageError> {
        self.insert_observation(new, evidence, now)
    }

    fn observation_row(&self, observation_id: ObservationId) -> Option<&ObservationRecord> {
        self.observation(observation_id)
    }

    fn observation_row_for_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Option<(ObservationId, Option<VehicleId>)> {
        self.observation_for_idempotency_key(idempotency_key)
    }

    fn evidence_rows(&self, observation_id: ObservationId) -> Vec<&EvidenceItemRecord> {
        self.evidence_for_observation(observation_id)
    }

    fn observation_has_placard_row(&self, observation_id: ObservationId) -> bool {
        self.observation_has_placard_evidence(observation_id)
    }

    fn attempt_overwrite_observation_row(
        &mut self,
        observation_id: ObservationId,
    ) -> Result<(), StorageError> {
        self.attempt_overwrite_observation(observation_id)
    }

    fn attempt_overwrite_evidence_row(
        &mut self,
        evidence_id: EvidenceItemId,
    ) -> Result<(), StorageError> {
        self.attempt_overwrite_evidence_item(evidence_id)
    }

    fn soft_delete_observation_row(
        &mut self,
        observation_id: ObservationId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        self.soft_delete_observation(observation_id, now)
    }
}

impl ViolationLedgerRepo for EnforcementStore {
    fn open_violation_row(
        &mut self,
        new: NewViolation,
        observation_id: ObservationId,
        notes: Option<String>,
        performed_by: ActorId,
        now: Timestamp,
    ) -> Result<ViolationId, StorageError> {
        self.open_violation(new, observation_id, notes, performed_by, now)
    }

    fn append_violation_event_row(
        &mut self,
        input: ViolationEventInput,
    ) -> Result<ViolationEvent, StorageError> {
        self.append_violation_event(input)
    }

    fn violation_row(&self, violation_id: ViolationId) -> Option<&ViolationRecord> {
        self.violation(violation_id)
    }

    fn open_violation_row_for_key(&self, key: &OpenViolationKey) -> Option<ViolationId> {
        self.open_violation_for_key(key)
    }

    fn open_violation_rows(&self) -> Vec<&ViolationRecord> {
        self.open_violations()
    }

    fn open_violation_rows_for_vehicle(
        &self,
        vehicle_id: VehicleId,
        category: ViolationCategory,
    ) -> Vec<&ViolationRecord> {
        self.open_violations_for_vehicle(vehicle_id, category)
    }

    fn violation_event_rows_for(&self, violation_id: ViolationId) -> Vec<&ViolationEvent> {
        self.violation_events(violation_id)
    }

    fn linked_observation_rows(&self, violation_id: ViolationId) -> Vec<ObservationId> {
        self.linked_observation_ids(violation_id)
    }

    fn attempt_overwrite_violation_event_row(
        &mut self,
        event_id: ViolationEventId,
    ) -> Result<(), StorageError> {
        self.attempt_overwrite_violation_event(event_id)
    }

    fn rebuild_violation_projection_rows(&mut self) {
        self.rebuild_violation_projections_from_ledger();
    }
}

impl NoticeRepo for EnforcementStore {
    fn insert_notice_row(
        &mut self,
        new: NewNotice,
        now: Timestamp,
    ) -> Result<NoticeRecord, StorageError> {
        self.insert_notice(new, now)
    }

    fn notice_row(&self, notice_id: NoticeId) -> Option<&NoticeRecord> {
        self.notice(notice_id)
    }

    fn notice_row_for_idempotency_key(&self, idempotency_key: &str) -> Option<&NoticeRecord> {
        self.notice_for_idempotency_key(idempotency_key)
    }

    fn notice_row_by_access_token(&self, token: &AccessToken) -> Option<&NoticeRecord> {
        self.notice_by_access_token(token)
    }

    fn access_token_row_in_use(&self, token: &AccessToken) -> bool {
        self.access_token_in_use(token)
    }

    fn notice_rows_for_violation(&self, violation_id: ViolationId) -> Vec<&NoticeRecord> {
        self.notices_for_violation(violation_id)
    }

    fn mark_notice_printed_row(
        &mut self,
        notice_id: NoticeId,
        now: Timestamp,
    ) -> Result<NoticeRecord, StorageError> {
        self.mark_notice_printed(notice_id, now)
    }

    fn soft_delete_notice_row(
        &mut self,
        notice_id: NoticeId,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        self.soft_delete_notice(notice_id, now)
    }
}
