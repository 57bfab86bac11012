//! Space domain model.
//!
//! Spaces are deployment namespaces inside an organization. Apps, service
//! instances and routes all live in exactly one space.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Space {
    pub id: Uuid,
    /// The organization this space belongs to.
    pub organization_id: Uuid,
    /// Unique within the organization.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSpace {
    pub organization_id: Uuid,
    pub name: String,
}

/// Fields that can be updated on an existing space.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSpace {
    pub name: Option<String>,
}
