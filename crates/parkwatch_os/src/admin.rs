#![forbid(unsafe_code)]

use std::sync::Arc;

use parkwatch_kernel_contracts::notice::NoticeId;
use parkwatch_kernel_contracts::observation::ObservationId;
use parkwatch_kernel_contracts::position::{
    ParkingPositionId, ParkingPositionInput, ParkingPositionRecord,
};
use parkwatch_kernel_contracts::vehicle::VehicleId;
use parkwatch_kernel_contracts::violation::{OpenViolationKey, ViolationCategory};
use parkwatch_kernel_contracts::{ActorId, ContractViolation, SiteId, Timestamp, Validate};
use parkwatch_storage::repo::{NoticeRepo, ObservationRepo, ParkingPositionRepo, VehicleRepo};
use parkwatch_storage::{EnforcementStore, SharedEnforcementStore, StorageError};
use tracing::info;

use crate::config::EnforcementConfig;
use crate::derivation::{attach_or_create, AttachOutcome};
use crate::error::EnforcementError;

/// Officer-initiated violation for categories no rule derives (fire lane, no-parking zone).
/// The observation supplies site, vehicle and stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualViolationRequest {
    pub observation_id: ObservationId,
    pub category: ViolationCategory,
}

/// Administrative edits: manual violations, stall layout and tombstones.
#[derive(Debug, Clone)]
pub struct ViolationAdminRuntime {
    config: Arc<EnforcementConfig>,
}

impl ViolationAdminRuntime {
    pub fn new(config: Arc<EnforcementConfig>) -> Self {
        Self { config }
    }

    /// Same attach-or-create path as derivation, so the open-tuple rule still holds.
    pub fn open_manual_violation(
        &self,
        store: &SharedEnforcementStore,
        req: ManualViolationRequest,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<AttachOutcome, EnforcementError> {
        performed_by.validate()?;
        let policy = self.config.transition_policy;
        let outcome = store.with_transaction(|s| {
            let observation = s
                .observation_row(req.observation_id)
                .cloned()
                .ok_or_else(|| EnforcementError::not_found("observations", req.observation_id.0))?;
            let vehicle_id = observation.vehicle_id.ok_or(ContractViolation::InvalidValue {
                field: "manual_violation_request.observation_id",
                reason: "observation has no vehicle",
            })?;
            let key = OpenViolationKey::new(
                observation.site_id.clone(),
                vehicle_id,
                observation.parking_position_id,
                req.category,
            );
            attach_or_create(
                s,
                policy,
                &key,
                observation.observation_id,
                observation.observed_at,
                performed_by,
                now,
            )
        })?;
        info!(
            observation_id = req.observation_id.0,
            violation_id = outcome.violation_id.0,
            category = req.category.as_str(),
            created = outcome.created,
            performed_by = performed_by.as_str(),
            "manual violation recorded"
        );
        Ok(outcome)
    }

    /// Creates a stall when `position_id` is `None`, otherwise edits it in place.
    pub fn upsert_parking_position(
        &self,
        store: &SharedEnforcementStore,
        position_id: Option<ParkingPositionId>,
        input: ParkingPositionInput,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<ParkingPositionRecord, EnforcementError> {
        performed_by.validate()?;
        let rec = store.with_transaction(|s| {
            s.upsert_parking_position_row(position_id, input, now)
                .map_err(EnforcementError::from)
        })?;
        info!(
            position_id = rec.position_id.0,
            position_type = rec.position_type.as_str(),
            created = position_id.is_none(),
            performed_by = performed_by.as_str(),
            "parking position saved"
        );
        Ok(rec)
    }

    pub fn parking_positions_for_site(
        &self,
        store: &SharedEnforcementStore,
        site_id: &SiteId,
    ) -> Result<Vec<ParkingPositionRecord>, EnforcementError> {
        Ok(store.read(|s| {
            s.parking_position_rows_for_site(site_id)
                .into_iter()
                .cloned()
                .collect()
        })?)
    }

    pub fn soft_delete_observation(
        &self,
        store: &SharedEnforcementStore,
        observation_id: ObservationId,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<(), EnforcementError> {
        self.tombstone(store, "observations", observation_id.0, performed_by, |s| {
            s.soft_delete_observation_row(observation_id, now)
        })
    }

    pub fn soft_delete_vehicle(
        &self,
        store: &SharedEnforcementStore,
        vehicle_id: VehicleId,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<(), EnforcementError> {
        self.tombstone(store, "vehicles", vehicle_id.0, performed_by, |s| {
            s.soft_delete_vehicle_row(vehicle_id, now)
        })
    }

    pub fn soft_delete_parking_position(
        &self,
        store: &SharedEnforcementStore,
        position_id: ParkingPositionId,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<(), EnforcementError> {
        self.tombstone(store, "parking_positions", position_id.0, performed_by, |s| {
            s.soft_delete_parking_position_row(position_id, now)
        })
    }

    pub fn soft_delete_notice(
        &self,
        store: &SharedEnforcementStore,
        notice_id: NoticeId,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<(), EnforcementError> {
        self.tombstone(store, "notices", notice_id.0, performed_by, |s| {
            s.soft_delete_notice_row(notice_id, now)
        })
    }

    fn tombstone<F>(
        &self,
        store: &SharedEnforcementStore,
        table: &'static str,
        id: u64,
        performed_by: &ActorId,
        f: F,
    ) -> Result<(), EnforcementError>
    where
        F: FnOnce(&mut EnforcementStore) -> Result<(), StorageError>,
    {
        performed_by.validate()?;
        store.with_transaction(|s| f(s).map_err(EnforcementError::from))?;
        info!(table, id, performed_by = performed_by.as_str(), "row soft-deleted");
        Ok(())
    }
}
