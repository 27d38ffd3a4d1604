#![forbid(unsafe_code)]

use std::sync::Arc;

use parkwatch_engines::timeline::{due_transition, DueTransition};
use parkwatch_kernel_contracts::violation::{ViolationEventInput, ViolationId};
use parkwatch_kernel_contracts::Timestamp;
use parkwatch_storage::repo::ViolationLedgerRepo;
use parkwatch_storage::SharedEnforcementStore;
use tracing::{debug, error, info, warn};

use crate::config::EnforcementConfig;
use crate::error::EnforcementError;
use crate::ledger::append_checked;

/// Batch pass that emits timeline-driven transitions. At most one step per
/// violation per call; multi-step progressions need repeated calls.
#[derive(Debug, Clone)]
pub struct TimelineEvaluatorRuntime {
    config: Arc<EnforcementConfig>,
}

impl TimelineEvaluatorRuntime {
    pub fn new(config: Arc<EnforcementConfig>) -> Self {
        Self { config }
    }

    /// Returns the number of committed transitions. Nothing due is `Ok(0)`.
    ///
    /// A step that fails for its own violation is logged and skipped. A store-level
    /// failure still lets the rest of the pass run, then comes back as the error.
    pub fn evaluate_timelines(
        &self,
        store: &SharedEnforcementStore,
        now: Timestamp,
    ) -> Result<usize, EnforcementError> {
        let candidates: Vec<ViolationId> = store.read(|s| {
            s.open_violation_rows()
                .into_iter()
                .map(|v| v.violation_id)
                .collect()
        })?;

        let mut applied = 0usize;
        let mut fatal: Option<EnforcementError> = None;
        for violation_id in candidates {
            match self.step(store, violation_id, now) {
                Ok(Some(due)) => {
                    applied += 1;
                    info!(
                        violation_id = violation_id.0,
                        event_type = due.event_type.as_str(),
                        threshold_hours = due.threshold_hours,
                        "timeline transition applied"
                    );
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => {
                    error!(violation_id = violation_id.0, error = %e, "timeline transition failed");
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    warn!(violation_id = violation_id.0, error = %e, "timeline transition skipped");
                }
            }
        }
        debug!(transitions = applied, "timeline pass complete");
        match fatal {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    fn step(
        &self,
        store: &SharedEnforcementStore,
        violation_id: ViolationId,
        now: Timestamp,
    ) -> Result<Option<DueTransition>, EnforcementError> {
        let policy = self.config.transition_policy;
        store.with_transaction(|s| {
            // Re-read: another pass or an officer may have moved it since the snapshot.
            let Some(v) = s.violation_row(violation_id).filter(|v| v.is_open()) else {
                return Ok(None);
            };
            let Some(rule) = self.config.timeline.rule(v.category) else {
                return Ok(None);
            };
            let Some(due) = due_transition(v.status, now - v.detected_at, rule) else {
                return Ok(None);
            };
            append_checked(
                s,
                policy,
                ViolationEventInput {
                    violation_id,
                    event_type: due.event_type,
                    observation_id: None,
                    notice_id: None,
                    notes: Some(format!(
                        "automatic {} after {}h",
                        due.event_type.as_str(),
                        due.threshold_hours
                    )),
                    performed_by: self.config.system_actor.clone(),
                    created_at: now,
                },
            )?;
            Ok(Some(due))
        })
    }
}
