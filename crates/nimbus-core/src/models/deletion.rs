//! Deletion plans: the ordered, fully-expanded form of a cascading delete.
//!
//! A plan is computed from a snapshot of the subtree below a deletion root
//! and executed by the storage layer in a single transaction. Steps are
//! listed deepest-first, so leaves are always removed before their parents.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage_event::NewUsageEvent;

/// What a deletion step removes and how the step's ids select rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ServiceBinding,
    Route,
    App,
    ServiceInstance,
    /// Space role edges, selected by space id.
    SpaceRoles,
    /// Staging security group bindings, selected by space id.
    StagingSecurityGroups,
    /// Running security group bindings, selected by space id.
    RunningSecurityGroups,
    Space,
    Domain,
    ServicePlanVisibility,
    /// Organization role edges, selected by organization id.
    OrgRoles,
    Organization,
}

impl ResourceKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::ServiceBinding => "service_binding",
            Self::Route => "route",
            Self::App => "app",
            Self::ServiceInstance => "service_instance",
            Self::SpaceRoles => "space_role",
            Self::StagingSecurityGroups => "staging_space",
            Self::RunningSecurityGroups => "running_space",
            Self::Space => "space",
            Self::Domain => "domain",
            Self::ServicePlanVisibility => "service_plan_visibility",
            Self::OrgRoles => "org_role",
            Self::Organization => "organization",
        }
    }

    /// Column the step's ids are matched against; `None` means the record id.
    pub fn key_column(self) -> Option<&'static str> {
        match self {
            Self::SpaceRoles | Self::StagingSecurityGroups | Self::RunningSecurityGroups => {
                Some("space_id")
            }
            Self::OrgRoles => Some("organization_id"),
            _ => None,
        }
    }

    /// Whether the step removes graph nodes rather than edges.
    pub fn is_node(self) -> bool {
        self.key_column().is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionStep {
    pub kind: ResourceKind,
    pub ids: Vec<Uuid>,
}

/// Expected child count of a set of parents at planning time.
///
/// The executor re-counts inside its transaction and aborts on mismatch,
/// so rows created between planning and execution are never orphaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanGuard {
    pub kind: ResourceKind,
    pub parent_column: &'static str,
    pub parent_ids: Vec<Uuid>,
    pub expected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    pub root_kind: ResourceKind,
    pub root_id: Uuid,
    pub organization_id: Uuid,
    pub steps: Vec<DeletionStep>,
    /// Recorded in the same transaction, before any row is removed.
    pub usage_events: Vec<NewUsageEvent>,
    pub guards: Vec<PlanGuard>,
    /// Apps that were started when the plan was made; re-checked on execute.
    pub started_app_ids: Vec<Uuid>,
}

impl DeletionPlan {
    pub fn ids(&self, kind: ResourceKind) -> impl Iterator<Item = Uuid> + '_ {
        self.steps
            .iter()
            .filter(move |s| s.kind == kind)
            .flat_map(|s| s.ids.iter().copied())
    }

    /// Summary of the graph nodes this plan removes.
    pub fn deleted_set(&self) -> DeletedSet {
        DeletedSet {
            entries: self
                .steps
                .iter()
                .filter(|s| s.kind.is_node() && !s.ids.is_empty())
                .cloned()
                .collect(),
        }
    }
}

/// Nodes removed by a delete, in the order they were removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedSet {
    pub entries: Vec<DeletionStep>,
}

impl DeletedSet {
    pub fn ids(&self, kind: ResourceKind) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|s| s.kind == kind)
            .flat_map(|s| s.ids.iter().copied())
            .collect()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.iter().any(|s| s.ids.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|s| s.ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
