#![forbid(unsafe_code)]

use std::sync::Arc;

use parkwatch_kernel_contracts::observation::{
    EvidenceItemRecord, ObservationId, ObservationRecord, ObservationSubmitRequest,
    ObservationSubmitResult,
};
use parkwatch_kernel_contracts::{ActorId, ContractViolation, Timestamp, Validate};
use parkwatch_storage::repo::{ObservationRepo, ParkingPositionRepo};
use parkwatch_storage::{NewObservation, SharedEnforcementStore, OBSERVATIONS_IDEMPOTENCY_KEY};
use tracing::{debug, info, warn};

use crate::config::EnforcementConfig;
use crate::error::EnforcementError;
use crate::vehicle::resolve_in_txn;

/// Idempotent intake of enforcement encounters.
///
/// Derivation is not run here; the caller hands the persisted observation to
/// `ViolationDerivationRuntime` afterward.
#[derive(Debug, Clone)]
pub struct ObservationIntakeRuntime {
    config: Arc<EnforcementConfig>,
}

impl ObservationIntakeRuntime {
    pub fn new(config: Arc<EnforcementConfig>) -> Self {
        Self { config }
    }

    pub fn submit(
        &self,
        store: &SharedEnforcementStore,
        req: &ObservationSubmitRequest,
        submitted_by: &ActorId,
        now: Timestamp,
    ) -> Result<ObservationSubmitResult, EnforcementError> {
        if let Some(existing) = self.existing(store, &req.idempotency_key)? {
            debug!(
                idempotency_key = %req.idempotency_key,
                observation_id = existing.observation_id.0,
                "observation replay"
            );
            return Ok(existing);
        }

        req.validate()?;
        submitted_by.validate()?;
        if req.evidence.len() > self.config.max_evidence_items {
            return Err(ContractViolation::InvalidValue {
                field: "observation_submit_request.evidence",
                reason: "too many evidence items",
            }
            .into());
        }

        let outcome = store.with_transaction(|s| {
            let vehicle_id = match req.plate_and_state()? {
                Some((plate, state)) => Some(resolve_in_txn(
                    s,
                    plate,
                    state,
                    req.vehicle_description.clone(),
                    req.observed_at,
                    now,
                )?),
                None => None,
            };

            let parking_position_id = match (req.parking_position_id, &req.location) {
                (Some(id), _) => Some(id),
                (None, Some(point)) => s
                    .locate_position_row(&req.site_id, point)
                    .map(|p| p.position_id),
                (None, None) => None,
            };

            let observation_id = s.insert_observation_row(
                NewObservation {
                    site_id: req.site_id.clone(),
                    vehicle_id,
                    parking_position_id,
                    location: req.location,
                    observed_at: req.observed_at,
                    registration: req.registration()?,
                    idempotency_key: req.idempotency_key.clone(),
                    submitted_by: submitted_by.clone(),
                },
                req.evidence.clone(),
                now,
            )?;
            Ok::<_, EnforcementError>(ObservationSubmitResult {
                observation_id,
                vehicle_id,
                created: true,
            })
        });

        match outcome {
            Ok(result) => {
                info!(
                    observation_id = result.observation_id.0,
                    vehicle_id = result.vehicle_id.map(|v| v.0),
                    evidence_items = req.evidence.len(),
                    "observation recorded"
                );
                Ok(result)
            }
            Err(e) if e.is_conflict_on(OBSERVATIONS_IDEMPOTENCY_KEY) => {
                warn!(
                    idempotency_key = %req.idempotency_key,
                    "observation idempotency race lost; returning winner"
                );
                self.existing(store, &req.idempotency_key)?
                    .ok_or_else(|| EnforcementError::not_found("observations", &req.idempotency_key))
            }
            Err(e) => Err(e),
        }
    }

    fn existing(
        &self,
        store: &SharedEnforcementStore,
        idempotency_key: &str,
    ) -> Result<Option<ObservationSubmitResult>, EnforcementError> {
        Ok(store.read(|s| {
            s.observation_row_for_idempotency_key(idempotency_key)
                .map(|(observation_id, vehicle_id)| ObservationSubmitResult {
                    observation_id,
                    vehicle_id,
                    created: false,
                })
        })?)
    }

    pub fn observation(
        &self,
        store: &SharedEnforcementStore,
        observation_id: ObservationId,
    ) -> Result<ObservationRecord, EnforcementError> {
        store
            .read(|s| s.observation_row(observation_id).cloned())?
            .ok_or_else(|| EnforcementError::not_found("observations", observation_id.0))
    }

    /// Evidence in creation order.
    pub fn evidence_for_observation(
        &self,
        store: &SharedEnforcementStore,
        observation_id: ObservationId,
    ) -> Result<Vec<EvidenceItemRecord>, EnforcementError> {
        store
            .read(|s| {
                s.observation_row(observation_id).map(|_| {
                    s.evidence_rows(observation_id)
                        .into_iter()
                        .cloned()
                        .collect::<Vec<_>>()
                })
            })?
            .ok_or_else(|| EnforcementError::not_found("observations", observation_id.0))
    }
}
