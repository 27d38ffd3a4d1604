#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::Duration;
use parkwatch_kernel_contracts::violation::{ViolationCategory, ViolationEventType, ViolationStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hours after detection at which each automatic transition becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineRule {
    pub notice_eligible_after_hours: u32,
    pub escalation_after_hours: u32,
    pub tow_eligible_after_hours: u32,
}

impl TimelineRule {
    pub const fn new(notice: u32, escalation: u32, tow: u32) -> Self {
        Self {
            notice_eligible_after_hours: notice,
            escalation_after_hours: escalation,
            tow_eligible_after_hours: tow,
        }
    }

    fn is_ordered(&self) -> bool {
        self.notice_eligible_after_hours <= self.escalation_after_hours
            && self.escalation_after_hours <= self.tow_eligible_after_hours
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineTableError {
    #[error("timeline table has no rule for {0}")]
    MissingCategory(&'static str),
    #[error("timeline rule for {0} must satisfy notice <= escalation <= tow")]
    Unordered(&'static str),
}

/// Frozen category → rule mapping. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimelineTable {
    rules: BTreeMap<ViolationCategory, TimelineRule>,
}

impl TimelineTable {
    pub fn mvp_v1() -> Self {
        let rules = BTreeMap::from([
            (ViolationCategory::FireLane, TimelineRule::new(0, 24, 48)),
            (
                ViolationCategory::AccessibleNoPlacard,
                TimelineRule::new(24, 72, 168),
            ),
            (
                ViolationCategory::UnauthorizedStall,
                TimelineRule::new(24, 72, 168),
            ),
            (
                ViolationCategory::ExpiredRegistration,
                TimelineRule::new(48, 168, 336),
            ),
            (ViolationCategory::NoParkingZone, TimelineRule::new(0, 48, 96)),
        ]);
        Self { rules }
    }

    /// Every category must be covered and every rule ordered.
    pub fn new(rules: BTreeMap<ViolationCategory, TimelineRule>) -> Result<Self, TimelineTableError> {
        for category in ViolationCategory::ALL {
            let rule = rules
                .get(&category)
                .ok_or(TimelineTableError::MissingCategory(category.as_str()))?;
            if !rule.is_ordered() {
                return Err(TimelineTableError::Unordered(category.as_str()));
            }
        }
        Ok(Self { rules })
    }

    pub fn rule(&self, category: ViolationCategory) -> Option<&TimelineRule> {
        self.rules.get(&category)
    }
}

impl<'de> Deserialize<'de> for TimelineTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let rules = BTreeMap::<ViolationCategory, TimelineRule>::deserialize(deserializer)?;
        TimelineTable::new(rules).map_err(serde::de::Error::custom)
    }
}

/// A transition the evaluator should append, with the threshold that made it due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTransition {
    pub event_type: ViolationEventType,
    pub threshold_hours: u32,
}

/// At most one step per evaluation, taken from the current status only.
///
/// NOTICE_ELIGIBLE waits for a notice to be issued, so it never advances here.
pub fn due_transition(
    status: ViolationStatus,
    elapsed: Duration,
    rule: &TimelineRule,
) -> Option<DueTransition> {
    let (event_type, threshold_hours) = match status {
        ViolationStatus::Detected => (
            ViolationEventType::NoticeEligible,
            rule.notice_eligible_after_hours,
        ),
        ViolationStatus::NoticeIssued => {
            (ViolationEventType::Escalated, rule.escalation_after_hours)
        }
        ViolationStatus::Escalated => {
            (ViolationEventType::TowEligible, rule.tow_eligible_after_hours)
        }
        ViolationStatus::NoticeEligible
        | ViolationStatus::TowEligible
        | ViolationStatus::Resolved
        | ViolationStatus::Dismissed => return None,
    };
    if elapsed.num_minutes() >= i64::from(threshold_hours) * 60 {
        Some(DueTransition {
            event_type,
            threshold_hours,
        })
    } else {
        None
    }
}
