//! Library crate for ldap-sweep-rs exposing reusable modules.
pub mod probe;
pub mod report;
pub mod sweep;
pub mod targets;
pub mod types;
