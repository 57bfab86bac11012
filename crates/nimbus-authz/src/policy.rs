//! Role-based access policy.
//!
//! [`Permissions`] is the resolved role set of one actor. Every check
//! first asks whether the target is visible; an invisible target is
//! denied as [`DenyReason::NotVisible`] and reported as not found, so the
//! existence of other tenants' resources never leaks.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Display;

use nimbus_core::error::{NimbusError, NimbusResult};
use nimbus_core::models::role::{GlobalRole, OrgRole, SpaceRole, UserRoles};
use nimbus_core::models::security_group::GloballyEnabled;
use tracing::debug;
use uuid::Uuid;

/// Kinds of resource an actor may create under a parent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Organization,
    Space,
    App,
    ServiceInstance,
    ServiceBinding,
    Route,
    PrivateDomain,
    SharedDomain,
    SecurityGroup,
    QuotaDefinition,
    ServicePlanVisibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    /// Creating a child; evaluated against the parent node.
    Create(Child),
    Update,
    Delete,
    /// Granting or revoking roles on the node.
    ManageRoles,
    /// Reading decrypted service credentials.
    ReadCredentials,
}

impl Operation {
    fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Authorization target, carrying the context the policy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// The platform root: parent of organizations and global resources.
    Platform,
    Organization {
        id: Uuid,
    },
    Space {
        id: Uuid,
        organization_id: Uuid,
    },
    /// An app, service instance, service binding or route.
    SpaceResource {
        space_id: Uuid,
        organization_id: Uuid,
    },
    Domain {
        owning_organization_id: Option<Uuid>,
    },
    SecurityGroup {
        globally_enabled: GloballyEnabled,
        space_ids: Vec<Uuid>,
    },
    QuotaDefinition,
    ServicePlanVisibility {
        organization_id: Uuid,
    },
    UsageEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The actor cannot see the target at all.
    NotVisible,
    /// The actor only holds read-only global roles.
    ReadOnly,
    /// The actor can see the target but lacks the role for the operation.
    InsufficientRole(&'static str),
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotVisible => f.write_str("target not visible"),
            Self::ReadOnly => f.write_str("read-only roles cannot modify resources"),
            Self::InsufficientRole(required) => write!(f, "requires {required}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }

    /// Converts a denial into the error the caller reports: not-found for
    /// invisible targets, forbidden otherwise.
    pub fn into_result(self, entity: &str, id: impl Display) -> NimbusResult<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(DenyReason::NotVisible) => Err(NimbusError::not_found(entity, id)),
            Self::Deny(reason) => Err(NimbusError::Forbidden {
                reason: reason.to_string(),
            }),
        }
    }
}

/// Resolved roles of one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    user_id: Option<Uuid>,
    global_roles: HashSet<GlobalRole>,
    org_roles: HashMap<Uuid, HashSet<OrgRole>>,
    space_roles: HashMap<Uuid, HashSet<SpaceRole>>,
    /// Organization owning each space the actor has a role in.
    space_orgs: HashMap<Uuid, Uuid>,
}

impl Permissions {
    pub fn new(
        user_id: Uuid,
        global_roles: impl IntoIterator<Item = GlobalRole>,
        roles: UserRoles,
    ) -> Self {
        let mut perms = Self {
            user_id: Some(user_id),
            global_roles: global_roles.into_iter().collect(),
            ..Default::default()
        };
        for a in roles.org_roles {
            perms
                .org_roles
                .entry(a.organization_id)
                .or_default()
                .insert(a.role);
        }
        for a in roles.space_roles {
            perms.space_roles.entry(a.space_id).or_default().insert(a.role);
            perms.space_orgs.insert(a.space_id, a.organization_id);
        }
        perms
    }

    /// The platform itself, used for seeding and internal maintenance.
    pub fn system() -> Self {
        Self {
            global_roles: HashSet::from([GlobalRole::Admin]),
            ..Default::default()
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.global_roles.contains(&GlobalRole::Admin)
    }

    /// Any global role grants read access to everything.
    pub fn is_global_reader(&self) -> bool {
        !self.global_roles.is_empty()
    }

    fn read_only_global(&self) -> bool {
        self.is_global_reader() && !self.global_roles.iter().any(|r| r.can_write())
    }

    pub fn has_org_role(&self, organization_id: Uuid, role: OrgRole) -> bool {
        self.org_roles
            .get(&organization_id)
            .is_some_and(|roles| roles.contains(&role))
    }

    pub fn has_space_role(&self, space_id: Uuid, role: SpaceRole) -> bool {
        self.space_roles
            .get(&space_id)
            .is_some_and(|roles| roles.contains(&role))
    }

    fn any_space_role(&self, space_id: Uuid) -> bool {
        self.space_roles
            .get(&space_id)
            .is_some_and(|roles| !roles.is_empty())
    }

    /// Any org role in the organization, or any role in one of its spaces.
    pub fn is_member_of(&self, organization_id: Uuid) -> bool {
        self.org_roles
            .get(&organization_id)
            .is_some_and(|roles| !roles.is_empty())
            || self.space_orgs.values().any(|org| *org == organization_id)
    }

    /// Organizations the actor belongs to, directly or through a space.
    pub fn member_organization_ids(&self) -> Vec<Uuid> {
        let ids: BTreeSet<Uuid> = self
            .org_roles
            .iter()
            .filter(|(_, roles)| !roles.is_empty())
            .map(|(id, _)| *id)
            .chain(self.space_orgs.values().copied())
            .collect();
        ids.into_iter().collect()
    }

    /// Organizations the actor manages.
    pub fn managed_organization_ids(&self) -> Vec<Uuid> {
        let ids: BTreeSet<Uuid> = self
            .org_roles
            .iter()
            .filter(|(_, roles)| roles.contains(&OrgRole::Manager))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().collect()
    }

    /// Spaces the actor holds any role in.
    pub fn space_ids(&self) -> Vec<Uuid> {
        let ids: BTreeSet<Uuid> = self
            .space_roles
            .iter()
            .filter(|(_, roles)| !roles.is_empty())
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().collect()
    }

    fn can_read_space(&self, space_id: Uuid, organization_id: Uuid) -> bool {
        self.has_org_role(organization_id, OrgRole::Manager) || self.any_space_role(space_id)
    }

    /// Visibility of a node.
    pub fn can_read(&self, node: &Node) -> bool {
        if self.is_global_reader() {
            return true;
        }
        match node {
            Node::Platform | Node::QuotaDefinition => true,
            Node::Organization { id } => self.is_member_of(*id),
            Node::Space {
                id,
                organization_id,
            } => self.can_read_space(*id, *organization_id),
            Node::SpaceResource {
                space_id,
                organization_id,
            } => self.can_read_space(*space_id, *organization_id),
            Node::Domain {
                owning_organization_id,
            } => owning_organization_id.is_none_or(|owner| self.is_member_of(owner)),
            Node::SecurityGroup {
                globally_enabled,
                space_ids,
            } => globally_enabled.any() || space_ids.iter().any(|s| self.any_space_role(*s)),
            Node::ServicePlanVisibility { organization_id } => self
                .org_roles
                .get(organization_id)
                .is_some_and(|roles| !roles.is_empty()),
            Node::UsageEvent => false,
        }
    }

    /// Decides whether the actor may perform `operation` on `node`.
    pub fn authorize(&self, operation: Operation, node: &Node) -> Decision {
        let decision = self.decide(operation, node);
        if let Decision::Deny(reason) = decision {
            debug!(
                user_id = ?self.user_id,
                ?operation,
                ?node,
                %reason,
                "Authorization denied"
            );
        }
        decision
    }

    fn decide(&self, operation: Operation, node: &Node) -> Decision {
        if !self.can_read(node) {
            return Decision::Deny(DenyReason::NotVisible);
        }
        if !operation.is_write() || self.is_admin() {
            return Decision::Allow;
        }

        let required = match (node, operation) {
            (Node::Organization { id }, Operation::Update | Operation::ManageRoles)
            | (
                Node::Organization { id },
                Operation::Create(Child::Space | Child::PrivateDomain),
            ) => Some(("org manager", self.has_org_role(*id, OrgRole::Manager))),

            (
                Node::Space {
                    id,
                    organization_id,
                },
                Operation::Update | Operation::ManageRoles,
            ) => Some((
                "org manager or space manager",
                self.has_org_role(*organization_id, OrgRole::Manager)
                    || self.has_space_role(*id, SpaceRole::Manager),
            )),
            (
                Node::Space {
                    organization_id, ..
                },
                Operation::Delete,
            ) => Some((
                "org manager",
                self.has_org_role(*organization_id, OrgRole::Manager),
            )),
            (
                Node::Space { id, .. },
                Operation::Create(
                    Child::App | Child::ServiceInstance | Child::ServiceBinding | Child::Route,
                ),
            )
            | (
                Node::SpaceResource { space_id: id, .. },
                Operation::Update | Operation::Delete | Operation::ReadCredentials,
            ) => Some((
                "space developer",
                self.has_space_role(*id, SpaceRole::Developer),
            )),

            (
                Node::Domain {
                    owning_organization_id: Some(owner),
                },
                Operation::Delete,
            ) => Some(("org manager", self.has_org_role(*owner, OrgRole::Manager))),

            // Everything else is reserved for admins.
            _ => None,
        };

        match required {
            Some((_, true)) => Decision::Allow,
            _ if self.read_only_global() => Decision::Deny(DenyReason::ReadOnly),
            Some((role, false)) => Decision::Deny(DenyReason::InsufficientRole(role)),
            None => Decision::Deny(DenyReason::InsufficientRole("admin")),
        }
    }
}

#[cfg(test)]
mod tests {
    use nimbus_core::models::role::{OrgRoleAssignment, SpaceRoleAssignment};

    use super::*;

    struct World {
        org: Uuid,
        space: Uuid,
    }

    fn world() -> World {
        World {
            org: Uuid::new_v4(),
            space: Uuid::new_v4(),
        }
    }

    fn actor(w: &World, org: &[OrgRole], space: &[SpaceRole]) -> Permissions {
        let user_id = Uuid::new_v4();
        Permissions::new(
            user_id,
            [],
            UserRoles {
                org_roles: org
                    .iter()
                    .map(|role| OrgRoleAssignment {
                        user_id,
                        organization_id: w.org,
                        role: *role,
                    })
                    .collect(),
                space_roles: space
                    .iter()
                    .map(|role| SpaceRoleAssignment {
                        user_id,
                        space_id: w.space,
                        organization_id: w.org,
                        role: *role,
                    })
                    .collect(),
            },
        )
    }

    fn global(role: GlobalRole) -> Permissions {
        Permissions::new(Uuid::new_v4(), [role], UserRoles::default())
    }

    fn space_node(w: &World) -> Node {
        Node::Space {
            id: w.space,
            organization_id: w.org,
        }
    }

    fn resource_node(w: &World) -> Node {
        Node::SpaceResource {
            space_id: w.space,
            organization_id: w.org,
        }
    }

    #[test]
    fn space_role_makes_parent_organization_visible() {
        let w = world();
        let dev = actor(&w, &[OrgRole::User], &[SpaceRole::Developer]);
        assert!(dev.can_read(&Node::Organization { id: w.org }));
        assert!(dev.can_read(&resource_node(&w)));
        assert_eq!(dev.member_organization_ids(), vec![w.org]);
    }

    #[test]
    fn org_user_without_space_role_cannot_see_spaces() {
        let w = world();
        let user = actor(&w, &[OrgRole::User], &[]);
        assert!(user.can_read(&Node::Organization { id: w.org }));
        assert!(!user.can_read(&space_node(&w)));
        assert_eq!(
            user.authorize(Operation::Read, &resource_node(&w)),
            Decision::Deny(DenyReason::NotVisible)
        );
    }

    #[test]
    fn org_manager_sees_and_manages_every_space() {
        let w = world();
        let manager = actor(&w, &[OrgRole::User, OrgRole::Manager], &[]);
        assert!(manager.authorize(Operation::Delete, &space_node(&w)).is_allowed());
        assert!(
            manager
                .authorize(Operation::Create(Child::Space), &Node::Organization { id: w.org })
                .is_allowed()
        );
        // Space children need a developer.
        assert_eq!(
            manager.authorize(Operation::Update, &resource_node(&w)),
            Decision::Deny(DenyReason::InsufficientRole("space developer"))
        );
    }

    #[test]
    fn space_manager_updates_but_cannot_delete_the_space() {
        let w = world();
        let sm = actor(&w, &[OrgRole::User], &[SpaceRole::Manager]);
        assert!(sm.authorize(Operation::Update, &space_node(&w)).is_allowed());
        assert!(sm.authorize(Operation::ManageRoles, &space_node(&w)).is_allowed());
        assert!(!sm.authorize(Operation::Delete, &space_node(&w)).is_allowed());
    }

    #[test]
    fn developer_writes_space_resources_and_reads_credentials() {
        let w = world();
        let dev = actor(&w, &[OrgRole::User], &[SpaceRole::Developer]);
        assert!(
            dev.authorize(Operation::Create(Child::App), &space_node(&w))
                .is_allowed()
        );
        assert!(
            dev.authorize(Operation::ReadCredentials, &resource_node(&w))
                .is_allowed()
        );

        let auditor = actor(&w, &[OrgRole::User], &[SpaceRole::Auditor]);
        assert!(auditor.can_read(&resource_node(&w)));
        assert!(
            !auditor
                .authorize(Operation::ReadCredentials, &resource_node(&w))
                .is_allowed()
        );
    }

    #[test]
    fn read_only_global_roles_see_everything_but_write_nothing() {
        let w = world();
        for role in [GlobalRole::AdminReadOnly, GlobalRole::GlobalAuditor] {
            let perms = global(role);
            assert!(perms.can_read(&resource_node(&w)));
            assert!(perms.can_read(&Node::UsageEvent));
            assert_eq!(
                perms.authorize(Operation::Update, &Node::Organization { id: w.org }),
                Decision::Deny(DenyReason::ReadOnly)
            );
            assert!(
                !perms
                    .authorize(Operation::ReadCredentials, &resource_node(&w))
                    .is_allowed()
            );
        }
    }

    #[test]
    fn admin_may_do_anything() {
        let w = world();
        let admin = global(GlobalRole::Admin);
        assert!(admin.authorize(Operation::Delete, &Node::Organization { id: w.org }).is_allowed());
        assert!(
            admin
                .authorize(Operation::Create(Child::SecurityGroup), &Node::Platform)
                .is_allowed()
        );
        assert!(Permissions::system().is_admin());
    }

    #[test]
    fn only_admins_delete_organizations() {
        let w = world();
        let manager = actor(&w, &[OrgRole::User, OrgRole::Manager], &[]);
        assert_eq!(
            manager.authorize(Operation::Delete, &Node::Organization { id: w.org }),
            Decision::Deny(DenyReason::InsufficientRole("admin"))
        );
    }

    #[test]
    fn security_group_visibility() {
        let w = world();
        let nobody = Permissions::new(Uuid::new_v4(), [], UserRoles::default());
        let running = Node::SecurityGroup {
            globally_enabled: GloballyEnabled {
                running: true,
                staging: false,
            },
            space_ids: vec![],
        };
        let unbound = Node::SecurityGroup {
            globally_enabled: GloballyEnabled::default(),
            space_ids: vec![],
        };
        let bound = Node::SecurityGroup {
            globally_enabled: GloballyEnabled::default(),
            space_ids: vec![w.space],
        };

        assert!(nobody.can_read(&running));
        assert!(!nobody.can_read(&unbound));
        assert!(global(GlobalRole::GlobalAuditor).can_read(&unbound));

        let dev = actor(&w, &[OrgRole::User], &[SpaceRole::Developer]);
        assert!(dev.can_read(&bound));
        assert!(!dev.can_read(&unbound));
    }

    #[test]
    fn private_domains_are_visible_to_owner_members_only() {
        let w = world();
        let member = actor(&w, &[OrgRole::Auditor], &[]);
        let outsider = Permissions::new(Uuid::new_v4(), [], UserRoles::default());
        let private = Node::Domain {
            owning_organization_id: Some(w.org),
        };
        let shared = Node::Domain {
            owning_organization_id: None,
        };

        assert!(member.can_read(&private));
        assert!(!outsider.can_read(&private));
        assert!(outsider.can_read(&shared));
        assert!(!outsider.authorize(Operation::Delete, &shared).is_allowed());
    }

    #[test]
    fn invisible_targets_surface_as_not_found() {
        let err = Decision::Deny(DenyReason::NotVisible)
            .into_result("space", Uuid::nil())
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = Decision::Deny(DenyReason::ReadOnly)
            .into_result("space", Uuid::nil())
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
