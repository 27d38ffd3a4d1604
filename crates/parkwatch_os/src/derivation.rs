#![forbid(unsafe_code)]

use std::sync::Arc;

use parkwatch_engines::derivation::applicable_violations;
use parkwatch_engines::transition::{check_transition, TransitionPolicy};
use parkwatch_kernel_contracts::observation::{ObservationId, ObservationRecord};
use parkwatch_kernel_contracts::position::ParkingPositionRecord;
use parkwatch_kernel_contracts::violation::{
    OpenViolationKey, ViolationEventInput, ViolationEventType, ViolationId,
};
use parkwatch_kernel_contracts::{ActorId, Timestamp, Validate};
use parkwatch_storage::repo::{ObservationRepo, ParkingPositionRepo, ViolationLedgerRepo};
use parkwatch_storage::{NewViolation, SharedEnforcementStore};
use tracing::{debug, info};

use crate::config::EnforcementConfig;
use crate::error::EnforcementError;
use crate::ledger::append_checked;

/// Result of attaching an observation to the open violation for a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOutcome {
    pub violation_id: ViolationId,
    pub created: bool,
}

/// Turns an observation plus its stall into new or extended violations.
#[derive(Debug, Clone)]
pub struct ViolationDerivationRuntime {
    config: Arc<EnforcementConfig>,
}

impl ViolationDerivationRuntime {
    pub fn new(config: Arc<EnforcementConfig>) -> Self {
        Self { config }
    }

    /// All-or-nothing: either every touched violation gets its event, or none does.
    /// Returns every violation touched, in rule order.
    pub fn derive_from_observation(
        &self,
        store: &SharedEnforcementStore,
        observation: &ObservationRecord,
        position: Option<&ParkingPositionRecord>,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<Vec<ViolationId>, EnforcementError> {
        performed_by.validate()?;
        let keys = applicable_violations(observation, position);
        if keys.is_empty() {
            debug!(
                observation_id = observation.observation_id.0,
                "no violation rules apply"
            );
            return Ok(Vec::new());
        }

        let policy = self.config.transition_policy;
        let outcomes = store.with_transaction(|s| {
            if s.observation_row(observation.observation_id).is_none() {
                return Err(EnforcementError::not_found(
                    "observations",
                    observation.observation_id.0,
                ));
            }
            keys.iter()
                .map(|key| {
                    attach_or_create(
                        s,
                        policy,
                        key,
                        observation.observation_id,
                        observation.observed_at,
                        performed_by,
                        now,
                    )
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        for (key, outcome) in keys.iter().zip(&outcomes) {
            info!(
                observation_id = observation.observation_id.0,
                violation_id = outcome.violation_id.0,
                category = key.category.as_str(),
                created = outcome.created,
                "violation derived"
            );
        }
        Ok(outcomes.into_iter().map(|o| o.violation_id).collect())
    }

    /// Loads the persisted observation and its stall, then derives.
    pub fn derive_for_observation_id(
        &self,
        store: &SharedEnforcementStore,
        observation_id: ObservationId,
        performed_by: &ActorId,
        now: Timestamp,
    ) -> Result<Vec<ViolationId>, EnforcementError> {
        let (observation, position) = store.read(|s| {
            let observation = s.observation_row(observation_id).cloned();
            let position = observation
                .as_ref()
                .and_then(|o| o.parking_position_id)
                .and_then(|p| s.parking_position_row(p).cloned());
            (observation, position)
        })?;
        let observation =
            observation.ok_or_else(|| EnforcementError::not_found("observations", observation_id.0))?;
        self.derive_from_observation(store, &observation, position.as_ref(), performed_by, now)
    }
}

/// Appends to the open violation for `key`, or opens one with a DETECTED event.
///
/// Must run inside a store transaction: the existence check and the insert are
/// one unit. Re-deriving an already linked observation appends nothing.
pub(crate) fn attach_or_create<R: ViolationLedgerRepo>(
    s: &mut R,
    policy: TransitionPolicy,
    key: &OpenViolationKey,
    observation_id: ObservationId,
    detected_at: Timestamp,
    performed_by: &ActorId,
    now: Timestamp,
) -> Result<AttachOutcome, EnforcementError> {
    if let Some(violation_id) = s.open_violation_row_for_key(key) {
        if !s.linked_observation_rows(violation_id).contains(&observation_id) {
            append_checked(
                s,
                policy,
                ViolationEventInput {
                    violation_id,
                    event_type: ViolationEventType::ObservationAdded,
                    observation_id: Some(observation_id),
                    notice_id: None,
                    notes: Some(format!("observation {} attached", observation_id.0)),
                    performed_by: performed_by.clone(),
                    created_at: now,
                },
            )?;
        }
        return Ok(AttachOutcome {
            violation_id,
            created: false,
        });
    }

    check_transition(policy, None, ViolationEventType::Detected)?;
    let violation_id = s.open_violation_row(
        NewViolation {
            site_id: key.site_id.clone(),
            vehicle_id: key.vehicle_id,
            position_id: key.position_id,
            category: key.category,
            detected_at,
        },
        observation_id,
        Some(format!(
            "{} detected from observation {}",
            key.category.as_str(),
            observation_id.0
        )),
        performed_by.clone(),
        now,
    )?;
    Ok(AttachOutcome {
        violation_id,
        created: true,
    })
}
