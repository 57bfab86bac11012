//! Organizations, their membership and their quota usage.

use nimbus_authz::policy::{Child, Node, Operation, Permissions};
use nimbus_core::error::{NimbusError, NimbusResult};
use nimbus_core::models::deletion::DeletedSet;
use nimbus_core::models::organization::{CreateOrganization, Organization, UpdateOrganization};
use nimbus_core::models::quota::OrganizationUsage;
use nimbus_core::models::role::{OrgRole, OrgRoleAssignment};
use nimbus_core::models::user::{CreateUser, User};
use nimbus_core::repository::{
    AppRepository, OrganizationRepository, PaginatedResult, Pagination,
    QuotaDefinitionRepository, ResourceStore, RoleRepository, UserRepository,
};
use tracing::info;
use uuid::Uuid;

use super::ControlPlane;
use crate::constraints::ProposedChange;

impl<S: ResourceStore> ControlPlane<S> {
    /// Registers a user known to the identity provider. Admin only.
    pub async fn register_user(&self, perms: &Permissions, input: CreateUser) -> NimbusResult<User> {
        if !perms.is_admin() {
            return Err(NimbusError::Forbidden {
                reason: "only admins register users".into(),
            });
        }
        self.store.users().create(input).await
    }

    /// Creates an organization.
    ///
    /// Admins may always create one. Other users may when user
    /// organization creation is enabled, and then become its manager.
    pub async fn create_organization(
        &self,
        perms: &Permissions,
        mut input: CreateOrganization,
    ) -> NimbusResult<Organization> {
        let decision = perms.authorize(Operation::Create(Child::Organization), &Node::Platform);
        let self_service = self.config.user_org_creation
            && perms.user_id().is_some()
            && !perms.is_global_reader();
        if !decision.is_allowed() && !self_service {
            decision.into_result("organization", &input.name)?;
        }

        self.validate(ProposedChange::CreateOrganization { name: &input.name })
            .await?;

        if input.quota_definition_id.is_none() {
            if let Some(name) = &self.config.default_quota_name {
                input.quota_definition_id =
                    self.store.quotas().find_by_name(name).await?.map(|q| q.id);
            }
        }
        if let Some(quota_id) = input.quota_definition_id {
            self.store.quotas().get_by_id(quota_id).await?;
        }

        let manager = if perms.is_admin() { None } else { perms.user_id() };
        self.store.organizations().create(input, manager).await
    }

    pub async fn get_organization(&self, perms: &Permissions, id: Uuid) -> NimbusResult<Organization> {
        self.visible_organization(perms, id).await
    }

    /// Organizations visible to the actor, in creation order.
    pub async fn list_organizations(
        &self,
        perms: &Permissions,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<Organization>> {
        if perms.is_global_reader() {
            return self.store.organizations().list(pagination).await;
        }
        let organizations = self
            .store
            .organizations()
            .list_by_ids(&perms.member_organization_ids())
            .await?;
        Ok(PaginatedResult::from_vec(organizations, pagination))
    }

    /// Updates fields and, when `manager_ids` is set, replaces the manager
    /// set. Status, billing and quota changes are reserved for admins.
    pub async fn update_organization(
        &self,
        perms: &Permissions,
        id: Uuid,
        input: UpdateOrganization,
    ) -> NimbusResult<Organization> {
        let organization = self.visible_organization(perms, id).await?;
        perms
            .authorize(Operation::Update, &Node::Organization { id })
            .into_result("organization", id)?;
        let admin_fields = input.status.is_some()
            || input.billing_enabled.is_some()
            || input.quota_definition_id.is_some();
        if admin_fields && !perms.is_admin() {
            return Err(NimbusError::Forbidden {
                reason: "only admins change status, billing or quota".into(),
            });
        }
        Self::ensure_writable(perms, &organization)?;

        if let Some(name) = &input.name {
            self.validate(ProposedChange::RenameOrganization {
                organization_id: id,
                name,
            })
            .await?;
        }
        if let Some(manager_ids) = &input.manager_ids {
            self.validate(ProposedChange::SetOrganizationManagers {
                organization_id: id,
                manager_ids,
            })
            .await?;
        }
        if let Some(quota_id) = input.quota_definition_id {
            self.store.quotas().get_by_id(quota_id).await?;
        }

        self.store.organizations().update(id, input).await
    }

    /// Deletes an organization; with `recursive`, everything it owns goes
    /// in the same transaction.
    pub async fn delete_organization(
        &self,
        perms: &Permissions,
        id: Uuid,
        recursive: bool,
    ) -> NimbusResult<DeletedSet> {
        let organization = self.visible_organization(perms, id).await?;
        perms
            .authorize(Operation::Delete, &Node::Organization { id })
            .into_result("organization", id)?;

        let plan = self
            .planner()
            .plan_organization(&organization, recursive)
            .await?;
        let deleted = self.execute_plan(&plan).await?;
        info!(organization_id = %id, removed = deleted.len(), "Organization deleted");
        Ok(deleted)
    }

    /// Memory quota and current usage of started apps.
    pub async fn organization_usage(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<OrganizationUsage> {
        let organization = self.visible_organization(perms, id).await?;
        let limit = match organization.quota_definition_id {
            Some(quota_id) => Some(self.store.quotas().get_by_id(quota_id).await?.memory_limit_mb),
            None => None,
        };
        let used = self.store.apps().started_memory_mb(id).await?;
        Ok(OrganizationUsage::new(limit, used))
    }

    pub async fn list_organization_members(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<Vec<OrgRoleAssignment>> {
        self.visible_organization(perms, id).await?;
        self.store.roles().org_members(id).await
    }

    async fn manageable_organization(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<Organization> {
        let organization = self.visible_organization(perms, id).await?;
        perms
            .authorize(Operation::ManageRoles, &Node::Organization { id })
            .into_result("organization", id)?;
        Self::ensure_writable(perms, &organization)?;
        Ok(organization)
    }

    pub async fn add_organization_role(
        &self,
        perms: &Permissions,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> NimbusResult<()> {
        self.manageable_organization(perms, organization_id).await?;
        self.store.users().get_by_id(user_id).await?;
        self.store
            .roles()
            .add_org_role(organization_id, user_id, role)
            .await
    }

    /// Revokes one organization role. Revoking `user` removes the user from
    /// the organization altogether, as [`Self::remove_user`] does.
    pub async fn remove_organization_role(
        &self,
        perms: &Permissions,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> NimbusResult<()> {
        if role == OrgRole::User {
            return self.remove_user(perms, organization_id, user_id).await;
        }
        self.manageable_organization(perms, organization_id).await?;

        if role == OrgRole::Manager {
            let remaining: Vec<Uuid> = self
                .store
                .roles()
                .org_role_holders(organization_id, OrgRole::Manager)
                .await?
                .into_iter()
                .filter(|m| *m != user_id)
                .collect();
            self.validate(ProposedChange::SetOrganizationManagers {
                organization_id,
                manager_ids: &remaining,
            })
            .await?;
        }
        self.store
            .roles()
            .remove_org_role(organization_id, user_id, role)
            .await
    }

    /// Removes a user from an organization. Fails while the user still
    /// holds a role in one of its spaces.
    pub async fn remove_user(
        &self,
        perms: &Permissions,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> NimbusResult<()> {
        self.manageable_organization(perms, organization_id).await?;
        self.validate(ProposedChange::RemoveOrganizationUser {
            organization_id,
            user_id,
        })
        .await?;
        self.store
            .roles()
            .remove_user_from_organization(organization_id, user_id, false)
            .await
    }

    /// Removes a user from an organization and from every space in it, in
    /// one transaction.
    pub async fn remove_user_recursive(
        &self,
        perms: &Permissions,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> NimbusResult<()> {
        self.manageable_organization(perms, organization_id).await?;
        let managers = self
            .store
            .roles()
            .org_role_holders(organization_id, OrgRole::Manager)
            .await?;
        let remaining: Vec<Uuid> = managers.into_iter().filter(|m| *m != user_id).collect();
        self.validate(ProposedChange::SetOrganizationManagers {
            organization_id,
            manager_ids: &remaining,
        })
        .await?;
        self.store
            .roles()
            .remove_user_from_organization(organization_id, user_id, true)
            .await
    }
}
