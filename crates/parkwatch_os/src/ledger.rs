#![forbid(unsafe_code)]

use std::sync::Arc;

use parkwatch_engines::transition::{check_transition, TransitionPolicy};
use parkwatch_kernel_contracts::notice::NoticeId;
use parkwatch_kernel_contracts::observation::ObservationId;
use parkwatch_kernel_contracts::violation::{
    ViolationEvent, ViolationEventId, ViolationEventInput, ViolationEventType, ViolationId,
    ViolationRecord,
};
use parkwatch_kernel_contracts::{ActorId, Timestamp};
use parkwatch_storage::repo::ViolationLedgerRepo;
use parkwatch_storage::SharedEnforcementStore;
use tracing::info;

use crate::config::EnforcementConfig;
use crate::error::EnforcementError;

/// Optional fields of an appended event. `performed_by` falls back to the system actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddEventOptions {
    pub observation_id: Option<ObservationId>,
    pub notice_id: Option<NoticeId>,
    pub notes: Option<String>,
    pub performed_by: Option<ActorId>,
}

/// Append-only violation event log. Status columns are only ever a fold over it.
#[derive(Debug, Clone)]
pub struct ViolationLedgerRuntime {
    config: Arc<EnforcementConfig>,
}

impl ViolationLedgerRuntime {
    pub fn new(config: Arc<EnforcementConfig>) -> Self {
        Self { config }
    }

    pub fn add_event(
        &self,
        store: &SharedEnforcementStore,
        violation_id: ViolationId,
        event_type: ViolationEventType,
        opts: AddEventOptions,
        now: Timestamp,
    ) -> Result<ViolationEvent, EnforcementError> {
        let notes = match (event_type, opts.notes) {
            (ViolationEventType::Dismissed, None) => {
                Some(self.config.default_dismissal_reason.clone())
            }
            (_, notes) => notes,
        };
        let input = ViolationEventInput {
            violation_id,
            event_type,
            observation_id: opts.observation_id,
            notice_id: opts.notice_id,
            notes,
            performed_by: opts
                .performed_by
                .unwrap_or_else(|| self.config.system_actor.clone()),
            created_at: now,
        };
        let policy = self.config.transition_policy;
        let event = store.with_transaction(|s| append_checked(s, policy, input))?;
        info!(
            violation_id = violation_id.0,
            event_id = event.event_id.0,
            event_type = event_type.as_str(),
            performed_by = event.performed_by.as_str(),
            "violation event appended"
        );
        Ok(event)
    }

    pub fn violation(
        &self,
        store: &SharedEnforcementStore,
        violation_id: ViolationId,
    ) -> Result<ViolationRecord, EnforcementError> {
        store
            .read(|s| s.violation_row(violation_id).cloned())?
            .ok_or_else(|| EnforcementError::not_found("violations", violation_id.0))
    }

    /// Full audit trail in creation order.
    pub fn events_for_violation(
        &self,
        store: &SharedEnforcementStore,
        violation_id: ViolationId,
    ) -> Result<Vec<ViolationEvent>, EnforcementError> {
        store
            .read(|s| {
                s.violation_row(violation_id).map(|_| {
                    s.violation_event_rows_for(violation_id)
                        .into_iter()
                        .cloned()
                        .collect::<Vec<_>>()
                })
            })?
            .ok_or_else(|| EnforcementError::not_found("violations", violation_id.0))
    }

    pub fn linked_observations(
        &self,
        store: &SharedEnforcementStore,
        violation_id: ViolationId,
    ) -> Result<Vec<ObservationId>, EnforcementError> {
        store
            .read(|s| {
                s.violation_row(violation_id)
                    .map(|_| s.linked_observation_rows(violation_id))
            })?
            .ok_or_else(|| EnforcementError::not_found("violations", violation_id.0))
    }

    pub fn open_violations(
        &self,
        store: &SharedEnforcementStore,
    ) -> Result<Vec<ViolationRecord>, EnforcementError> {
        Ok(store.read(|s| s.open_violation_rows().into_iter().cloned().collect())?)
    }

    /// Refolds every violation from its events. Returns how many remain open.
    pub fn rebuild_projections(
        &self,
        store: &SharedEnforcementStore,
    ) -> Result<usize, EnforcementError> {
        let count = store.with_transaction(|s| {
            s.rebuild_violation_projection_rows();
            Ok::<_, EnforcementError>(s.open_violation_rows().len())
        })?;
        info!(open_violations = count, "violation projections rebuilt");
        Ok(count)
    }

    /// Events are immutable; this always fails.
    pub fn attempt_overwrite_event(
        &self,
        store: &SharedEnforcementStore,
        event_id: ViolationEventId,
    ) -> Result<(), EnforcementError> {
        store.with_transaction(|s| {
            s.attempt_overwrite_violation_event_row(event_id)
                .map_err(EnforcementError::from)
        })
    }
}

/// Policy-checked append. Callers hold the store transaction.
pub(crate) fn append_checked<R: ViolationLedgerRepo>(
    s: &mut R,
    policy: TransitionPolicy,
    input: ViolationEventInput,
) -> Result<ViolationEvent, EnforcementError> {
    let current = s
        .violation_row(input.violation_id)
        .ok_or_else(|| EnforcementError::not_found("violations", input.violation_id.0))?
        .status;
    check_transition(policy, Some(current), input.event_type)?;
    Ok(s.append_violation_event_row(input)?)
}
