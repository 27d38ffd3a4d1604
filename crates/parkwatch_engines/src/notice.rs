#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use parkwatch_kernel_contracts::notice::{
    AccessToken, NoticeDeadlines, NoticePayload, NoticePayloadV1, StoredNoticePayload,
    NOTICE_PAYLOAD_SCHEMA_V1,
};
use parkwatch_kernel_contracts::violation::ViolationCategory;
use parkwatch_kernel_contracts::{ContractViolation, SchemaVersion, Timestamp};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const MIN_ACCESS_TOKEN_BYTES: usize = 16;
pub const MAX_ACCESS_TOKEN_BYTES: usize = 64;

/// Days after detection by which payment or an appeal is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeDeadlineRule {
    pub payment_due_days: u32,
    pub appeal_due_days: u32,
}

impl NoticeDeadlineRule {
    pub const fn new(payment_due_days: u32, appeal_due_days: u32) -> Self {
        Self {
            payment_due_days,
            appeal_due_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoticeDeadlineTableError {
    #[error("notice deadline table has no rule for {0}")]
    MissingCategory(&'static str),
    #[error("notice deadlines for {0} must be at least one day")]
    ZeroDays(&'static str),
}

/// Frozen category → deadline mapping. The more severe the category, the shorter the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NoticeDeadlineTable {
    rules: BTreeMap<ViolationCategory, NoticeDeadlineRule>,
}

impl NoticeDeadlineTable {
    pub fn mvp_v1() -> Self {
        let rules = BTreeMap::from([
            (ViolationCategory::FireLane, NoticeDeadlineRule::new(14, 7)),
            (ViolationCategory::NoParkingZone, NoticeDeadlineRule::new(21, 10)),
            (
                ViolationCategory::AccessibleNoPlacard,
                NoticeDeadlineRule::new(30, 14),
            ),
            (
                ViolationCategory::UnauthorizedStall,
                NoticeDeadlineRule::new(30, 14),
            ),
            (
                ViolationCategory::ExpiredRegistration,
                NoticeDeadlineRule::new(45, 21),
            ),
        ]);
        Self { rules }
    }

    pub fn new(
        rules: BTreeMap<ViolationCategory, NoticeDeadlineRule>,
    ) -> Result<Self, NoticeDeadlineTableError> {
        for category in ViolationCategory::ALL {
            let rule = rules
                .get(&category)
                .ok_or(NoticeDeadlineTableError::MissingCategory(category.as_str()))?;
            if rule.payment_due_days == 0 || rule.appeal_due_days == 0 {
                return Err(NoticeDeadlineTableError::ZeroDays(category.as_str()));
            }
        }
        Ok(Self { rules })
    }

    pub fn rule(&self, category: ViolationCategory) -> Option<&NoticeDeadlineRule> {
        self.rules.get(&category)
    }
}

impl<'de> Deserialize<'de> for NoticeDeadlineTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let rules = BTreeMap::<ViolationCategory, NoticeDeadlineRule>::deserialize(deserializer)?;
        NoticeDeadlineTable::new(rules).map_err(serde::de::Error::custom)
    }
}

pub fn compute_deadlines(detected_at: Timestamp, rule: &NoticeDeadlineRule) -> NoticeDeadlines {
    NoticeDeadlines {
        payment_due_at: detected_at + Duration::days(i64::from(rule.payment_due_days)),
        appeal_due_at: detected_at + Duration::days(i64::from(rule.appeal_due_days)),
    }
}

pub fn default_instructions(category: ViolationCategory) -> &'static str {
    match category {
        ViolationCategory::FireLane => {
            "Vehicle was stopped in a fire lane. Move the vehicle immediately; it may be towed without further notice."
        }
        ViolationCategory::AccessibleNoPlacard => {
            "Vehicle occupied an accessible stall without a visible placard. If a valid placard was held, submit it with an appeal."
        }
        ViolationCategory::UnauthorizedStall => {
            "Vehicle occupied a reserved or purchased stall assigned to another vehicle."
        }
        ViolationCategory::ExpiredRegistration => {
            "Vehicle registration has expired. Renew the registration and submit proof with an appeal."
        }
        ViolationCategory::NoParkingZone => {
            "Vehicle was parked in a no-parking zone. Move the vehicle to an authorized stall."
        }
    }
}

#[derive(Debug, Error)]
pub enum NoticePayloadError {
    #[error("unsupported notice payload schema version {0}")]
    UnsupportedVersion(u32),
    #[error("notice payload digest mismatch")]
    DigestMismatch,
    #[error("notice payload json: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn encode_payload(payload: &NoticePayload) -> Result<StoredNoticePayload, NoticePayloadError> {
    let body_json = match payload {
        NoticePayload::V1(p) => serde_json::to_string(p)?,
    };
    Ok(StoredNoticePayload {
        schema_version: payload.schema_version(),
        body_sha256_hex: sha256_hex(body_json.as_bytes()),
        body_json,
    })
}

/// Decodes a stored payload with the reader for the version it was written with.
pub fn decode_payload(stored: &StoredNoticePayload) -> Result<NoticePayload, NoticePayloadError> {
    if sha256_hex(stored.body_json.as_bytes()) != stored.body_sha256_hex {
        return Err(NoticePayloadError::DigestMismatch);
    }
    match stored.schema_version {
        v if v == NOTICE_PAYLOAD_SCHEMA_V1 => {
            let body: NoticePayloadV1 = serde_json::from_str(&stored.body_json)?;
            Ok(NoticePayload::V1(body))
        }
        SchemaVersion(other) => Err(NoticePayloadError::UnsupportedVersion(other)),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Random URL-safe bearer token for the notice QR code.
pub fn generate_access_token(byte_len: usize) -> Result<AccessToken, ContractViolation> {
    if !(MIN_ACCESS_TOKEN_BYTES..=MAX_ACCESS_TOKEN_BYTES).contains(&byte_len) {
        return Err(ContractViolation::InvalidRange {
            field: "access_token_bytes",
            min: MIN_ACCESS_TOKEN_BYTES as f64,
            max: MAX_ACCESS_TOKEN_BYTES as f64,
            got: byte_len as f64,
        });
    }
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    AccessToken::new(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parkwatch_kernel_contracts::notice::VehicleSummary;
    use parkwatch_kernel_contracts::violation::ViolationId;

    fn payload() -> NoticePayload {
        let detected_at = Utc.with_ymd_and_hms(2026, 4, 2, 10, 30, 0).unwrap();
        let rule = NoticeDeadlineTable::mvp_v1()
            .rule(ViolationCategory::UnauthorizedStall)
            .copied()
            .unwrap();
        NoticePayload::V1(NoticePayloadV1 {
            violation_id: ViolationId(3),
            category: ViolationCategory::UnauthorizedStall,
            detected_at,
            vehicle: VehicleSummary {
                license_plate: "ABC123".to_string(),
                issuing_state: "CA".to_string(),
                make: None,
                model: None,
                color: Some("blue".to_string()),
            },
            position: None,
            deadlines: compute_deadlines(detected_at, &rule),
            instructions: default_instructions(ViolationCategory::UnauthorizedStall).to_string(),
        })
    }

    #[test]
    fn at_notice_engine_01_deadlines_offset_from_detection() {
        let p = payload();
        let d = p.deadlines();
        assert_eq!(
            d.payment_due_at,
            Utc.with_ymd_and_hms(2026, 5, 2, 10, 30, 0).unwrap()
        );
        assert_eq!(
            d.appeal_due_at,
            Utc.with_ymd_and_hms(2026, 4, 16, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn at_notice_engine_02_fire_lane_window_is_shortest() {
        let table = NoticeDeadlineTable::mvp_v1();
        let fire = table.rule(ViolationCategory::FireLane).unwrap();
        for category in ViolationCategory::ALL {
            let r = table.rule(category).unwrap();
            assert!(fire.payment_due_days <= r.payment_due_days);
            assert!(fire.appeal_due_days <= r.appeal_due_days);
        }
    }

    #[test]
    fn at_notice_engine_03_stored_payload_carries_version_and_digest() {
        let stored = encode_payload(&payload()).unwrap();
        assert_eq!(stored.schema_version, NOTICE_PAYLOAD_SCHEMA_V1);
        assert_eq!(stored.body_sha256_hex.len(), 64);
        assert_eq!(decode_payload(&stored).unwrap(), payload());
    }

    #[test]
    fn at_notice_engine_04_tampered_or_unknown_version_rejected() {
        let mut stored = encode_payload(&payload()).unwrap();
        stored.body_json = stored.body_json.replace("ABC123", "XYZ999");
        assert!(matches!(
            decode_payload(&stored),
            Err(NoticePayloadError::DigestMismatch)
        ));

        let mut stored = encode_payload(&payload()).unwrap();
        stored.schema_version = SchemaVersion(9);
        assert!(matches!(
            decode_payload(&stored),
            Err(NoticePayloadError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn at_notice_engine_05_tokens_are_url_safe_and_distinct() {
        let a = generate_access_token(32).unwrap();
        let b = generate_access_token(32).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 43);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(generate_access_token(8).is_err());
    }
}
