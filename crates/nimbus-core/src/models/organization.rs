//! Organization domain model.
//!
//! Organizations are the top-level tenant and billing boundary. They own
//! spaces and private domains, and carry the organization-scoped roles
//! (`user`, `manager`, `billing_manager`, `auditor`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    #[default]
    Active,
    Suspended,
}

impl OrganizationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// A tenant of the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: Uuid,
    /// Globally unique display name.
    pub name: String,
    pub status: OrganizationStatus,
    pub billing_enabled: bool,
    pub quota_definition_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn is_suspended(&self) -> bool {
        self.status == OrganizationStatus::Suspended
    }
}

/// Fields required to create a new organization.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateOrganization {
    pub name: String,
    pub status: Option<OrganizationStatus>,
    pub billing_enabled: bool,
    pub quota_definition_id: Option<Uuid>,
}

/// Fields that can be updated on an existing organization.
///
/// `manager_ids` replaces the whole manager set when present; the node
/// fields and the edge set are committed together.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub status: Option<OrganizationStatus>,
    pub billing_enabled: Option<bool>,
    pub quota_definition_id: Option<Uuid>,
    pub manager_ids: Option<Vec<Uuid>>,
}
