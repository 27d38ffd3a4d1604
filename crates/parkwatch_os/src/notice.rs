#![forbid(unsafe_code)]

use std::sync::Arc;

use parkwatch_engines::notice::{
    compute_deadlines, decode_payload, default_instructions, encode_payload,
    generate_access_token,
};
use parkwatch_kernel_contracts::notice::{
    AccessToken, NoticeId, NoticeIssueRequest, NoticeIssueResult, NoticePayload, NoticePayloadV1,
    NoticeRecord, PositionSummary, VehicleSummary,
};
use parkwatch_kernel_contracts::violation::{ViolationEventInput, ViolationEventType};
use parkwatch_kernel_contracts::{ActorId, Timestamp, Validate};
use parkwatch_storage::repo::{NoticeRepo, ParkingPositionRepo, VehicleRepo, ViolationLedgerRepo};
use parkwatch_storage::{
    NewNotice, SharedEnforcementStore, NOTICES_ACCESS_TOKEN, NOTICES_IDEMPOTENCY_KEY,
};
use tracing::{debug, info, warn};

use crate::config::EnforcementConfig;
use crate::error::EnforcementError;
use crate::ledger::append_checked;

/// Fresh tokens drawn before giving up on a collision.
const MAX_TOKEN_ATTEMPTS: usize = 3;

/// Idempotent notice issuance plus the single printed-at transition.
#[derive(Debug, Clone)]
pub struct NoticeIssuanceRuntime {
    config: Arc<EnforcementConfig>,
}

impl NoticeIssuanceRuntime {
    pub fn new(config: Arc<EnforcementConfig>) -> Self {
        Self { config }
    }

    pub fn issue(
        &self,
        store: &SharedEnforcementStore,
        req: &NoticeIssueRequest,
        issued_by: &ActorId,
        now: Timestamp,
    ) -> Result<NoticeIssueResult, EnforcementError> {
        if let Some(existing) = self.existing(store, &req.idempotency_key)? {
            debug!(
                idempotency_key = %req.idempotency_key,
                notice_id = existing.notice_id.0,
                "notice replay"
            );
            return Ok(existing);
        }

        req.validate()?;
        issued_by.validate()?;

        let outcome = store.with_transaction(|s| self.issue_in_txn(s, req, issued_by, now));
        match outcome {
            Ok(result) => {
                info!(
                    notice_id = result.notice_id.0,
                    violation_id = req.violation_id.0,
                    category = result.payload.category().as_str(),
                    "notice issued"
                );
                Ok(result)
            }
            Err(e) if e.is_conflict_on(NOTICES_IDEMPOTENCY_KEY) => {
                warn!(
                    idempotency_key = %req.idempotency_key,
                    "notice idempotency race lost; returning winner"
                );
                self.existing(store, &req.idempotency_key)?
                    .ok_or_else(|| EnforcementError::not_found("notices", &req.idempotency_key))
            }
            Err(e) => Err(e),
        }
    }

    fn issue_in_txn<R>(
        &self,
        s: &mut R,
        req: &NoticeIssueRequest,
        issued_by: &ActorId,
        now: Timestamp,
    ) -> Result<NoticeIssueResult, EnforcementError>
    where
        R: ViolationLedgerRepo + VehicleRepo + ParkingPositionRepo + NoticeRepo,
    {
        let violation = s
            .violation_row(req.violation_id)
            .cloned()
            .ok_or_else(|| EnforcementError::not_found("violations", req.violation_id.0))?;
        let vehicle = s
            .vehicle_row(violation.vehicle_id)
            .ok_or_else(|| EnforcementError::not_found("vehicles", violation.vehicle_id.0))?;
        let vehicle = VehicleSummary {
            license_plate: vehicle.plate_key.plate().to_string(),
            issuing_state: vehicle.plate_key.state().to_string(),
            make: vehicle.description.make.clone(),
            model: vehicle.description.model.clone(),
            color: vehicle.description.color.clone(),
        };
        let position = violation
            .position_id
            .and_then(|p| s.parking_position_row(p))
            .map(|p| PositionSummary {
                position_id: p.position_id,
                position_type: p.position_type,
                identifier: p.identifier.clone(),
            });
        let rule = self
            .config
            .notice_deadlines
            .rule(violation.category)
            .ok_or_else(|| EnforcementError::not_found("notice_deadlines", violation.category.as_str()))?;

        let payload = NoticePayload::V1(NoticePayloadV1 {
            violation_id: violation.violation_id,
            category: violation.category,
            detected_at: violation.detected_at,
            vehicle,
            position,
            deadlines: compute_deadlines(violation.detected_at, rule),
            instructions: req
                .instructions
                .clone()
                .unwrap_or_else(|| default_instructions(violation.category).to_string()),
        });
        let stored = encode_payload(&payload)?;
        let access_token = self.fresh_token(&*s)?;

        let notice = s.insert_notice_row(
            NewNotice {
                violation_id: violation.violation_id,
                idempotency_key: req.idempotency_key.clone(),
                issued_by: issued_by.clone(),
                access_token,
                payload: stored,
            },
            now,
        )?;
        append_checked(
            s,
            self.config.transition_policy,
            ViolationEventInput {
                violation_id: violation.violation_id,
                event_type: ViolationEventType::NoticeIssued,
                observation_id: None,
                notice_id: Some(notice.notice_id),
                notes: Some(format!("notice {} issued", notice.notice_id.0)),
                performed_by: issued_by.clone(),
                created_at: now,
            },
        )?;

        Ok(NoticeIssueResult {
            notice_id: notice.notice_id,
            access_token: notice.access_token,
            payload,
            created: true,
        })
    }

    fn fresh_token<R: NoticeRepo>(&self, s: &R) -> Result<AccessToken, EnforcementError> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = generate_access_token(self.config.access_token_bytes)?;
            if !s.access_token_row_in_use(&token) {
                return Ok(token);
            }
            warn!("access token collision; drawing again");
        }
        Err(EnforcementError::Conflict {
            table: NOTICES_ACCESS_TOKEN,
            key: "<redacted>".to_string(),
        })
    }

    fn existing(
        &self,
        store: &SharedEnforcementStore,
        idempotency_key: &str,
    ) -> Result<Option<NoticeIssueResult>, EnforcementError> {
        let Some(notice) = store.read(|s| s.notice_row_for_idempotency_key(idempotency_key).cloned())?
        else {
            return Ok(None);
        };
        Ok(Some(NoticeIssueResult {
            notice_id: notice.notice_id,
            payload: decode_payload(&notice.payload)?,
            access_token: notice.access_token,
            created: false,
        }))
    }

    /// Sets `printed_at` once; repeat calls keep the first timestamp.
    pub fn mark_printed(
        &self,
        store: &SharedEnforcementStore,
        notice_id: NoticeId,
        now: Timestamp,
    ) -> Result<NoticeRecord, EnforcementError> {
        let notice = store.with_transaction(|s| {
            s.mark_notice_printed_row(notice_id, now)
                .map_err(EnforcementError::from)
        })?;
        debug!(notice_id = notice_id.0, printed_at = ?notice.printed_at, "notice printed");
        Ok(notice)
    }

    pub fn notice(
        &self,
        store: &SharedEnforcementStore,
        notice_id: NoticeId,
    ) -> Result<NoticeRecord, EnforcementError> {
        store
            .read(|s| s.notice_row(notice_id).cloned())?
            .ok_or_else(|| EnforcementError::not_found("notices", notice_id.0))
    }

    pub fn notice_by_access_token(
        &self,
        store: &SharedEnforcementStore,
        token: &AccessToken,
    ) -> Result<NoticeRecord, EnforcementError> {
        store
            .read(|s| s.notice_row_by_access_token(token).cloned())?
            .ok_or_else(|| EnforcementError::not_found("notices", "<redacted>"))
    }
}
