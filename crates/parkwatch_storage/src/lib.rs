#![forbid(unsafe_code)]

pub mod repo;
pub mod store;

pub use store::{
    EnforcementStore, NewNotice, NewObservation, NewViolation, SharedEnforcementStore,
    StorageError, NOTICES_ACCESS_TOKEN, NOTICES_IDEMPOTENCY_KEY, OBSERVATIONS_IDEMPOTENCY_KEY,
    OPEN_VIOLATION_TUPLE,
};
