#![forbid(unsafe_code)]

pub mod derivation;
pub mod notice;
pub mod registration;
pub mod timeline;
pub mod transition;
