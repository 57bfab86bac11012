//! Role model: global, organization-scoped and space-scoped roles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform-wide roles, carried by the access token rather than stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    Admin,
    AdminReadOnly,
    GlobalAuditor,
}

impl GlobalRole {
    pub fn can_write(self) -> bool {
        self == Self::Admin
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    User,
    Manager,
    BillingManager,
    Auditor,
}

impl OrgRole {
    pub const ALL: [OrgRole; 4] = [
        Self::User,
        Self::Manager,
        Self::BillingManager,
        Self::Auditor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Manager => "manager",
            Self::BillingManager => "billing_manager",
            Self::Auditor => "auditor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SpaceRole {
    Developer,
    Manager,
    Auditor,
}

impl SpaceRole {
    pub const ALL: [SpaceRole; 3] = [Self::Developer, Self::Manager, Self::Auditor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Manager => "manager",
            Self::Auditor => "auditor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrgRoleAssignment {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: OrgRole,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceRoleAssignment {
    pub user_id: Uuid,
    pub space_id: Uuid,
    pub organization_id: Uuid,
    pub role: SpaceRole,
}

/// Every stored role one user holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRoles {
    pub org_roles: Vec<OrgRoleAssignment>,
    pub space_roles: Vec<SpaceRoleAssignment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_round_trip_through_storage_strings() {
        for role in OrgRole::ALL {
            assert_eq!(OrgRole::parse(role.as_str()), Some(role));
        }
        for role in SpaceRole::ALL {
            assert_eq!(SpaceRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(OrgRole::parse("owner"), None);
    }
}
