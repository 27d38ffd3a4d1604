#![forbid(unsafe_code)]

pub mod common;
pub mod notice;
pub mod observation;
pub mod position;
pub mod vehicle;
pub mod violation;

pub use common::{
    ActorId, ContractViolation, RowTimestamps, SchemaVersion, SiteId, SoftDelete, Timestamp,
    Validate, SYSTEM_ACTOR,
};
