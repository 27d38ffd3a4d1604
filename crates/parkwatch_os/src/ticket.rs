#![forbid(unsafe_code)]

use std::fmt::Display;

use parkwatch_engines::notice::decode_payload;
use parkwatch_kernel_contracts::notice::{AccessToken, NoticeId, NoticePayload};
use parkwatch_kernel_contracts::observation::{
    EvidenceContent, EvidenceIntent, EvidenceItemId, EvidenceItemRecord, ObservationId,
};
use parkwatch_kernel_contracts::violation::{ViolationEvent, ViolationId, ViolationStatus};
use parkwatch_kernel_contracts::Timestamp;
use parkwatch_storage::repo::{NoticeRepo, ObservationRepo, ViolationLedgerRepo};
use parkwatch_storage::SharedEnforcementStore;
use tracing::debug;

use crate::error::EnforcementError;

/// Object-storage capability injected by the host. Called outside any store transaction.
pub trait EvidenceUrlResolver {
    type Error: Display;

    fn download_url(&self, storage_key: &str) -> Result<String, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketEvidenceContent {
    Photo { storage_key: String, download_url: String },
    Note { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketEvidence {
    pub evidence_id: EvidenceItemId,
    pub observation_id: ObservationId,
    pub content: TicketEvidenceContent,
    pub intent: Option<EvidenceIntent>,
    pub captured_at: Timestamp,
}

/// What a notice recipient sees after scanning the printed code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketView {
    pub notice_id: NoticeId,
    pub violation_id: ViolationId,
    pub payload: NoticePayload,
    pub status: ViolationStatus,
    pub events: Vec<ViolationEvent>,
    pub evidence: Vec<TicketEvidence>,
    pub printed_at: Option<Timestamp>,
}

#[derive(Debug, Default, Clone)]
pub struct TicketAccessRuntime;

impl TicketAccessRuntime {
    /// Unknown, malformed and soft-deleted tokens all read as `NotFound`.
    pub fn open_ticket<R: EvidenceUrlResolver>(
        &self,
        store: &SharedEnforcementStore,
        token: &str,
        resolver: &R,
    ) -> Result<TicketView, EnforcementError> {
        let not_found = || EnforcementError::not_found("notices", "<redacted>");
        let token = AccessToken::new(token.trim()).map_err(|_| not_found())?;

        let snapshot = store.read(|s| {
            let notice = s.notice_row_by_access_token(&token)?.clone();
            let violation = s.violation_row(notice.violation_id)?.clone();
            let events: Vec<ViolationEvent> = s
                .violation_event_rows_for(violation.violation_id)
                .into_iter()
                .cloned()
                .collect();
            let evidence: Vec<EvidenceItemRecord> = s
                .linked_observation_rows(violation.violation_id)
                .into_iter()
                .filter(|o| s.observation_row(*o).is_some())
                .flat_map(move |o| s.evidence_rows(o).into_iter().cloned())
                .collect();
            Some((notice, violation, events, evidence))
        })?;
        let (notice, violation, events, evidence) = snapshot.ok_or_else(not_found)?;

        let payload = decode_payload(&notice.payload)?;
        let evidence = evidence
            .into_iter()
            .map(|item| resolve_item(item, resolver))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            notice_id = notice.notice_id.0,
            violation_id = violation.violation_id.0,
            evidence_items = evidence.len(),
            "ticket opened"
        );
        Ok(TicketView {
            notice_id: notice.notice_id,
            violation_id: violation.violation_id,
            payload,
            status: violation.status,
            events,
            evidence,
            printed_at: notice.printed_at,
        })
    }
}

fn resolve_item<R: EvidenceUrlResolver>(
    item: EvidenceItemRecord,
    resolver: &R,
) -> Result<TicketEvidence, EnforcementError> {
    let content = match item.content {
        EvidenceContent::Photo { storage_key } => {
            let download_url =
                resolver
                    .download_url(&storage_key)
                    .map_err(|e| EnforcementError::EvidenceUrl {
                        storage_key: storage_key.clone(),
                        reason: e.to_string(),
                    })?;
            TicketEvidenceContent::Photo {
                storage_key,
                download_url,
            }
        }
        EvidenceContent::Note { text } => TicketEvidenceContent::Note { text },
    };
    Ok(TicketEvidence {
        evidence_id: item.evidence_id,
        observation_id: item.observation_id,
        content,
        intent: item.intent,
        captured_at: item.rows.created_at,
    })
}
