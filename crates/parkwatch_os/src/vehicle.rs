#![forbid(unsafe_code)]

use parkwatch_kernel_contracts::vehicle::{PlateKey, VehicleDescription, VehicleId, VehicleRecord};
use parkwatch_kernel_contracts::Timestamp;
use parkwatch_storage::repo::VehicleRepo;
use parkwatch_storage::SharedEnforcementStore;
use tracing::debug;

use crate::error::EnforcementError;

/// Normalizes plate/state into a durable vehicle identity.
#[derive(Debug, Default, Clone)]
pub struct VehicleResolverRuntime;

impl VehicleResolverRuntime {
    pub fn resolve_vehicle(
        &self,
        store: &SharedEnforcementStore,
        plate: &str,
        state: &str,
        observed_at: Timestamp,
        now: Timestamp,
    ) -> Result<VehicleId, EnforcementError> {
        store.with_transaction(|s| {
            resolve_in_txn(s, plate, state, VehicleDescription::default(), observed_at, now)
        })
    }

    pub fn vehicle(
        &self,
        store: &SharedEnforcementStore,
        vehicle_id: VehicleId,
    ) -> Result<VehicleRecord, EnforcementError> {
        store
            .read(|s| s.vehicle_row(vehicle_id).cloned())?
            .ok_or_else(|| EnforcementError::not_found("vehicles", vehicle_id.0))
    }

    /// `None` when no live vehicle carries the normalized plate.
    pub fn vehicle_by_plate(
        &self,
        store: &SharedEnforcementStore,
        plate: &str,
        state: &str,
    ) -> Result<Option<VehicleRecord>, EnforcementError> {
        let key = PlateKey::new(plate, state)?;
        Ok(store.read(|s| s.vehicle_row_by_plate(&key).cloned())?)
    }
}

pub(crate) fn resolve_in_txn<R: VehicleRepo>(
    store: &mut R,
    plate: &str,
    state: &str,
    description: VehicleDescription,
    observed_at: Timestamp,
    now: Timestamp,
) -> Result<VehicleId, EnforcementError> {
    let key = PlateKey::new(plate, state)?;
    let vehicle_id = store.resolve_vehicle_row(key, description, observed_at, now)?;
    debug!(vehicle_id = vehicle_id.0, "vehicle resolved");
    Ok(vehicle_id)
}
