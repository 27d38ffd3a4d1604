#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_id, validate_optional_text, ActorId, RowTimestamps, SoftDelete, Timestamp};
use crate::position::{ParkingPositionId, ParkingPositionType};
use crate::violation::{ViolationCategory, ViolationId};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const NOTICE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);
pub const NOTICE_PAYLOAD_SCHEMA_V1: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoticeId(pub u64);

/// Bearer token printed on a notice (QR payload) for recipient ticket access.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(token.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl Validate for AccessToken {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("access_token", &self.0, 128)?;
        if self.0.len() < 16 {
            return Err(ContractViolation::InvalidValue {
                field: "access_token",
                reason: "must be at least 16 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeIssueRequest {
    pub idempotency_key: String,
    pub violation_id: ViolationId,
    pub instructions: Option<String>,
}

impl Validate for NoticeIssueRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id(
            "notice_issue_request.idempotency_key",
            &self.idempotency_key,
            128,
        )?;
        validate_optional_text(
            "notice_issue_request.instructions",
            self.instructions.as_deref(),
            4096,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeDeadlines {
    pub payment_due_at: Timestamp,
    pub appeal_due_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub license_plate: String,
    pub issuing_state: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub position_id: ParkingPositionId,
    pub position_type: ParkingPositionType,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticePayloadV1 {
    pub violation_id: ViolationId,
    pub category: ViolationCategory,
    pub detected_at: Timestamp,
    pub vehicle: VehicleSummary,
    pub position: Option<PositionSummary>,
    pub deadlines: NoticeDeadlines,
    pub instructions: String,
}

/// Every payload shape ever stored. New shapes get a new variant; old ones are never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticePayload {
    V1(NoticePayloadV1),
}

impl NoticePayload {
    pub fn schema_version(&self) -> SchemaVersion {
        match self {
            NoticePayload::V1(_) => NOTICE_PAYLOAD_SCHEMA_V1,
        }
    }

    pub fn category(&self) -> ViolationCategory {
        match self {
            NoticePayload::V1(p) => p.category,
        }
    }

    pub fn deadlines(&self) -> &NoticeDeadlines {
        match self {
            NoticePayload::V1(p) => &p.deadlines,
        }
    }
}

/// Payload as persisted: version tag, serialized body and body digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNoticePayload {
    pub schema_version: SchemaVersion,
    pub body_json: String,
    pub body_sha256_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeRecord {
    pub schema_version: SchemaVersion,
    pub notice_id: NoticeId,
    pub violation_id: ViolationId,
    pub idempotency_key: String,
    pub issued_by: ActorId,
    pub access_token: AccessToken,
    pub payload: StoredNoticePayload,
    pub printed_at: Option<Timestamp>,
    pub rows: RowTimestamps,
}

impl SoftDelete for NoticeRecord {
    fn deleted_at(&self) -> Option<Timestamp> {
        self.rows.deleted_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeIssueResult {
    pub notice_id: NoticeId,
    pub access_token: AccessToken,
    pub payload: NoticePayload,
    pub created: bool,
}
