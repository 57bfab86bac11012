//! Nimbus Authz: access tokens, identity resolution and the role-based
//! access policy.

pub mod config;
pub mod error;
pub mod identity;
pub mod policy;
pub mod token;

pub use config::AuthzConfig;
pub use error::AuthzError;
pub use identity::IdentityResolver;
pub use policy::{Child, Decision, DenyReason, Node, Operation, Permissions};
pub use token::AccessTokenClaims;
