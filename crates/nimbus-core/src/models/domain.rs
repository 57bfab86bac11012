//! Domain model: shared (platform-wide) and private (organization-owned)
//! domains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainKind {
    Shared,
    Private { owning_organization_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    pub id: Uuid,
    pub name: String,
    pub kind: DomainKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    pub fn owning_organization_id(&self) -> Option<Uuid> {
        match self.kind {
            DomainKind::Shared => None,
            DomainKind::Private {
                owning_organization_id,
            } => Some(owning_organization_id),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, DomainKind::Shared)
    }

    /// Whether routes and apps of `organization_id` may use this domain.
    pub fn usable_by(&self, organization_id: Uuid) -> bool {
        self.owning_organization_id()
            .is_none_or(|owner| owner == organization_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDomain {
    pub name: String,
    /// `None` creates a shared domain.
    pub owning_organization_id: Option<Uuid>,
}
