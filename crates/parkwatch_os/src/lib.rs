#![forbid(unsafe_code)]

pub mod admin;
pub mod config;
pub mod derivation;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod notice;
pub mod reconcile;
pub mod ticket;
pub mod timeline;
pub mod vehicle;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::EnforcementConfig;
pub use error::EnforcementError;
