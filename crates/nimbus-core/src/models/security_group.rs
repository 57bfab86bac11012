//! Security group domain model.
//!
//! A security group is a named set of egress rules. It applies to every
//! space when globally enabled for the running or staging lifecycle, and
//! otherwise only to the spaces it is bound to. The two bindings are kept
//! as separate sets so the authorization code never confuses them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityGroupRule {
    pub protocol: Protocol,
    /// Single address, CIDR block, or `start-end` address range.
    pub destination: String,
    /// Single port, comma-separated list, or `start-end` range (tcp/udp only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub icmp_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "code")]
    pub icmp_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GloballyEnabled {
    pub running: bool,
    pub staging: bool,
}

impl GloballyEnabled {
    pub fn any(self) -> bool {
        self.running || self.staging
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityGroup {
    pub id: Uuid,
    /// Globally unique.
    pub name: String,
    pub rules: Vec<SecurityGroupRule>,
    pub globally_enabled: GloballyEnabled,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSecurityGroup {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<SecurityGroupRule>,
    #[serde(default)]
    pub globally_enabled: GloballyEnabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSecurityGroup {
    pub name: Option<String>,
    pub rules: Option<Vec<SecurityGroupRule>>,
    pub globally_enabled: Option<GloballyEnabled>,
}

/// Which lifecycle a space binding applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Running,
    Staging,
}

impl Lifecycle {
    /// Edge table holding bindings of this lifecycle.
    pub fn edge_table(self) -> &'static str {
        match self {
            Self::Running => "running_space",
            Self::Staging => "staging_space",
        }
    }
}

/// A reference to a related resource by id only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipRef {
    pub guid: Uuid,
}

/// A to-many relationship rendered as `{"data": [{"guid": ...}]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ToManyRelationship {
    pub data: Vec<RelationshipRef>,
}

impl ToManyRelationship {
    pub fn guids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.data.iter().map(|r| r.guid)
    }
}

impl FromIterator<Uuid> for ToManyRelationship {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().map(|guid| RelationshipRef { guid }).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SecurityGroupRelationships {
    pub staging_spaces: ToManyRelationship,
    pub running_spaces: ToManyRelationship,
}

impl SecurityGroupRelationships {
    /// Every space bound under either lifecycle.
    pub fn all_space_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .staging_spaces
            .guids()
            .chain(self.running_spaces.guids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationships_render_guid_lists() {
        let space = Uuid::new_v4();
        let rel = SecurityGroupRelationships {
            staging_spaces: ToManyRelationship::default(),
            running_spaces: [space].into_iter().collect(),
        };
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "staging_spaces": { "data": [] },
                "running_spaces": { "data": [{ "guid": space }] },
            })
        );
    }

    #[test]
    fn all_space_ids_deduplicates_across_lifecycles() {
        let shared = Uuid::new_v4();
        let rel = SecurityGroupRelationships {
            staging_spaces: [shared].into_iter().collect(),
            running_spaces: [shared, Uuid::new_v4()].into_iter().collect(),
        };
        assert_eq!(rel.all_space_ids().len(), 2);
    }
}
