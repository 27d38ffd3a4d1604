#![forbid(unsafe_code)]

use parkwatch_engines::notice::NoticePayloadError;
use parkwatch_engines::transition::TransitionRejected;
use parkwatch_kernel_contracts::ContractViolation;
use parkwatch_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnforcementError {
    /// Rejected before any write.
    #[error("validation failed: {0}")]
    Validation(#[from] ContractViolation),
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    /// A unique key was taken by a concurrent writer.
    #[error("conflict on {table}: {key}")]
    Conflict { table: &'static str, key: String },
    #[error("transition rejected: {0}")]
    InvalidTransition(#[from] TransitionRejected),
    #[error("stored notice payload unreadable: {0}")]
    Payload(#[from] NoticePayloadError),
    #[error("evidence url resolution failed for {storage_key}: {reason}")]
    EvidenceUrl { storage_key: String, reason: String },
    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl EnforcementError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        EnforcementError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Store-level failures that make further work pointless (poisoned lock,
    /// append-only breach). Everything else is scoped to one request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnforcementError::Storage(_))
    }

    /// True when this is the loss of a unique-key race on `table`.
    pub fn is_conflict_on(&self, table: &str) -> bool {
        matches!(self, EnforcementError::Conflict { table: t, .. } if *t == table)
    }
}

impl From<StorageError> for EnforcementError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { table, key } => EnforcementError::NotFound { entity: table, key },
            // A dangling reference is a missing row from the caller's point of view.
            StorageError::ForeignKeyViolation { table, key } => {
                EnforcementError::NotFound { entity: table, key }
            }
            StorageError::DuplicateKey { table, key } => EnforcementError::Conflict { table, key },
            StorageError::ContractViolation(v) => EnforcementError::Validation(v),
            e @ (StorageError::AppendOnlyViolation { .. } | StorageError::LockPoisoned) => {
                EnforcementError::Storage(e)
            }
        }
    }
}
