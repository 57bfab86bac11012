//! User domain model.
//!
//! Users are identities known to the platform. Authentication happens
//! elsewhere; the access token's subject is the user id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Identity-provider subject; generated when `None`.
    pub id: Option<Uuid>,
    pub username: String,
}
