//! Nimbus Control, the control-plane core over the resource graph.
//! Authorization, constraint validation, cascading deletes and usage
//! events all meet here.

pub mod cascade;
pub mod config;
pub mod constraints;
pub mod credentials;
mod plane;
pub mod usage;

pub use config::{ControlConfig, SeedConfig};
pub use plane::{ControlPlane, SeedReport};
