//! Route domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A `host.domain/path` address owned by a space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub space_id: Uuid,
    pub domain_id: Uuid,
    /// Empty for routes on the bare domain.
    pub host: String,
    /// Empty or starting with `/`.
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoute {
    pub space_id: Uuid,
    pub domain_id: Uuid,
    pub host: String,
    pub path: Option<String>,
}
