//! Nimbus core: the resource graph's domain models, repository traits,
//! error taxonomy and the pure validation rules the constraint engine
//! is built from.

pub mod error;
pub mod models;
pub mod repository;
pub mod validation;
