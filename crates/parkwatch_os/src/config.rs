#![forbid(unsafe_code)]

use std::path::Path;

use parkwatch_engines::notice::{NoticeDeadlineTable, MAX_ACCESS_TOKEN_BYTES, MIN_ACCESS_TOKEN_BYTES};
use parkwatch_engines::timeline::TimelineTable;
use parkwatch_engines::transition::TransitionPolicy;
use parkwatch_kernel_contracts::common::validate_text;
use parkwatch_kernel_contracts::violation::DEFAULT_DISMISSAL_REASON;
use parkwatch_kernel_contracts::{ActorId, ContractViolation, Validate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ContractViolation),
}

/// Runtime settings shared by every enforcement runtime.
///
/// Missing keys in a TOML override fall back to `mvp_v1()` values. Tables are
/// frozen once loaded; runtimes only read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnforcementConfig {
    pub system_actor: ActorId,
    pub default_dismissal_reason: String,
    pub transition_policy: TransitionPolicy,
    pub timeline: TimelineTable,
    pub notice_deadlines: NoticeDeadlineTable,
    pub access_token_bytes: usize,
    pub max_evidence_items: usize,
}

impl EnforcementConfig {
    pub fn mvp_v1() -> Self {
        Self {
            system_actor: ActorId::system(),
            default_dismissal_reason: DEFAULT_DISMISSAL_REASON.to_string(),
            transition_policy: TransitionPolicy::Permissive,
            timeline: TimelineTable::mvp_v1(),
            notice_deadlines: NoticeDeadlineTable::mvp_v1(),
            access_token_bytes: 32,
            max_evidence_items: 20,
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: EnforcementConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

impl Validate for EnforcementConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.system_actor.validate()?;
        validate_text(
            "enforcement_config.default_dismissal_reason",
            &self.default_dismissal_reason,
            2048,
        )?;
        if !(MIN_ACCESS_TOKEN_BYTES..=MAX_ACCESS_TOKEN_BYTES).contains(&self.access_token_bytes) {
            return Err(ContractViolation::InvalidRange {
                field: "enforcement_config.access_token_bytes",
                min: MIN_ACCESS_TOKEN_BYTES as f64,
                max: MAX_ACCESS_TOKEN_BYTES as f64,
                got: self.access_token_bytes as f64,
            });
        }
        if !(1..=1000).contains(&self.max_evidence_items) {
            return Err(ContractViolation::InvalidRange {
                field: "enforcement_config.max_evidence_items",
                min: 1.0,
                max: 1000.0,
                got: self.max_evidence_items as f64,
            });
        }
        Ok(())
    }
}
