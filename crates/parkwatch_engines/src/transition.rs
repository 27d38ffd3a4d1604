#![forbid(unsafe_code)]

use parkwatch_kernel_contracts::violation::{ViolationEventType, ViolationStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How strictly appended events are checked against the violation's current status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any event may follow any status (administrative override).
    #[default]
    Permissive,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{event} not allowed from {from}")]
pub struct TransitionRejected {
    pub from: &'static str,
    pub event: &'static str,
}

/// `current` is `None` for a violation with no events yet.
pub fn check_transition(
    policy: TransitionPolicy,
    current: Option<ViolationStatus>,
    event: ViolationEventType,
) -> Result<(), TransitionRejected> {
    if policy == TransitionPolicy::Permissive || strict_edge_allowed(current, event) {
        return Ok(());
    }
    Err(TransitionRejected {
        from: current.map(ViolationStatus::as_str).unwrap_or("NONE"),
        event: event.as_str(),
    })
}

fn strict_edge_allowed(current: Option<ViolationStatus>, event: ViolationEventType) -> bool {
    let Some(current) = current else {
        return event == ViolationEventType::Detected;
    };
    if current.is_terminal() {
        return false;
    }
    match event {
        ViolationEventType::Detected => false,
        ViolationEventType::NoticeEligible => current == ViolationStatus::Detected,
        ViolationEventType::Escalated => current == ViolationStatus::NoticeIssued,
        ViolationEventType::TowEligible => current == ViolationStatus::Escalated,
        ViolationEventType::ObservationAdded
        | ViolationEventType::NoticeIssued
        | ViolationEventType::Resolved
        | ViolationEventType::Dismissed => true,
    }
}
