#![forbid(unsafe_code)]

use std::sync::Arc;

use parkwatch_kernel_contracts::observation::ObservationId;
use parkwatch_kernel_contracts::vehicle::VehicleId;
use parkwatch_kernel_contracts::violation::{
    ViolationCategory, ViolationEventInput, ViolationEventType, ViolationId, ViolationRecord,
};
use parkwatch_kernel_contracts::Timestamp;
use parkwatch_storage::repo::{ObservationRepo, ViolationLedgerRepo};
use parkwatch_storage::SharedEnforcementStore;
use tracing::{debug, info};

use crate::config::EnforcementConfig;
use crate::error::EnforcementError;
use crate::ledger::append_checked;

/// Resolves provisional accessible-parking violations once placard evidence shows up.
///
/// Resolution is always a new RESOLVED event; the adverse observation is never touched.
#[derive(Debug, Clone)]
pub struct ComplianceReconcilerRuntime {
    config: Arc<EnforcementConfig>,
}

impl ComplianceReconcilerRuntime {
    pub fn new(config: Arc<EnforcementConfig>) -> Self {
        Self { config }
    }

    /// Returns the violations resolved by this pass, possibly none.
    pub fn evaluate_compliance(
        &self,
        store: &SharedEnforcementStore,
        vehicle_id: VehicleId,
        triggering_observation_id: ObservationId,
        now: Timestamp,
    ) -> Result<Vec<ViolationId>, EnforcementError> {
        let policy = self.config.transition_policy;
        let resolved = store.with_transaction(|s| {
            let trigger = s
                .observation_row(triggering_observation_id)
                .cloned()
                .ok_or_else(|| {
                    EnforcementError::not_found("observations", triggering_observation_id.0)
                })?;

            let candidates: Vec<ViolationRecord> = ViolationCategory::ALL
                .iter()
                .copied()
                .filter(|c| c.is_evidence_sensitive())
                .flat_map(|c| s.open_violation_rows_for_vehicle(vehicle_id, c))
                .cloned()
                .collect();

            let mut resolved = Vec::new();
            for v in candidates {
                let trigger_applies = trigger.vehicle_id == Some(vehicle_id)
                    && trigger
                        .parking_position_id
                        .map_or(true, |p| Some(p) == v.position_id);
                if !placard_seen(s, &v, trigger_applies.then_some(triggering_observation_id)) {
                    continue;
                }
                append_checked(
                    s,
                    policy,
                    ViolationEventInput {
                        violation_id: v.violation_id,
                        event_type: ViolationEventType::Resolved,
                        observation_id: Some(triggering_observation_id),
                        notice_id: None,
                        notes: Some(format!(
                            "placard evidence found; resolved by observation {}",
                            triggering_observation_id.0
                        )),
                        performed_by: self.config.system_actor.clone(),
                        created_at: now,
                    },
                )?;
                resolved.push(v.violation_id);
            }
            Ok::<_, EnforcementError>(resolved)
        })?;

        if resolved.is_empty() {
            debug!(
                vehicle_id = vehicle_id.0,
                observation_id = triggering_observation_id.0,
                "no placard resolution"
            );
        }
        for violation_id in &resolved {
            info!(
                violation_id = violation_id.0,
                vehicle_id = vehicle_id.0,
                observation_id = triggering_observation_id.0,
                "violation resolved by placard evidence"
            );
        }
        Ok(resolved)
    }
}

fn placard_seen<R: ObservationRepo + ViolationLedgerRepo>(
    s: &R,
    v: &ViolationRecord,
    trigger: Option<ObservationId>,
) -> bool {
    s.linked_observation_rows(v.violation_id)
        .into_iter()
        .chain(trigger)
        .any(|o| s.observation_has_placard_row(o))
}
