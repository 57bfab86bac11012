//! Domain models for the Nimbus resource graph.
//!
//! These are the core types shared across all crates.

pub mod app;
pub mod deletion;
pub mod domain;
pub mod organization;
pub mod quota;
pub mod role;
pub mod route;
pub mod security_group;
pub mod service_instance;
pub mod service_plan_visibility;
pub mod space;
pub mod usage_event;
pub mod user;
