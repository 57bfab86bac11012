use nimbus_authz::policy::{Child, Node, Operation, Permissions};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::deletion::DeletedSet;
use nimbus_core::models::organization::Organization;
use nimbus_core::models::role::{SpaceRole, SpaceRoleAssignment};
use nimbus_core::models::space::{CreateSpace, Space, UpdateSpace};
use nimbus_core::repository::{
    PaginatedResult, Pagination, ResourceStore, RoleRepository, SpaceRepository, UserRepository,
};
use tracing::info;
use uuid::Uuid;

use super::{ControlPlane, space_node};
use crate::constraints::ProposedChange;

impl<S: ResourceStore> ControlPlane<S> {
    pub async fn create_space(&self, perms: &Permissions, input: CreateSpace) -> NimbusResult<Space> {
        let organization = self
            .visible_organization(perms, input.organization_id)
            .await?;
        perms
            .authorize(
                Operation::Create(Child::Space),
                &Node::Organization {
                    id: organization.id,
                },
            )
            .into_result("organization", organization.id)?;
        Self::ensure_writable(perms, &organization)?;

        self.validate(ProposedChange::CreateSpace {
            organization_id: organization.id,
            name: &input.name,
        })
        .await?;
        self.store.spaces().create(input).await
    }

    pub async fn get_space(&self, perms: &Permissions, id: Uuid) -> NimbusResult<Space> {
        Ok(self.visible_space(perms, id).await?.0)
    }

    /// Visible spaces, optionally limited to one organization.
    pub async fn list_spaces(
        &self,
        perms: &Permissions,
        organization_id: Option<Uuid>,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<Space>> {
        let spaces = match organization_id {
            Some(id) => {
                self.visible_organization(perms, id).await?;
                self.store.spaces().list_by_organization(id).await?
            }
            None if perms.is_global_reader() => self.store.spaces().list_all().await?,
            None => {
                let ids = self.visible_space_ids(perms).await?;
                self.store.spaces().list_by_ids(&ids).await?
            }
        };
        let visible = spaces
            .into_iter()
            .filter(|s| perms.can_read(&space_node(s)))
            .collect();
        Ok(PaginatedResult::from_vec(visible, pagination))
    }

    /// Loads a space and checks `operation` on it.
    async fn writable_space(
        &self,
        perms: &Permissions,
        operation: Operation,
        id: Uuid,
    ) -> NimbusResult<(Space, Organization)> {
        let (space, organization) = self.visible_space(perms, id).await?;
        perms
            .authorize(operation, &space_node(&space))
            .into_result("space", id)?;
        Self::ensure_writable(perms, &organization)?;
        Ok((space, organization))
    }

    pub async fn update_space(
        &self,
        perms: &Permissions,
        id: Uuid,
        input: UpdateSpace,
    ) -> NimbusResult<Space> {
        let (space, _) = self.writable_space(perms, Operation::Update, id).await?;
        if let Some(name) = &input.name {
            self.validate(ProposedChange::RenameSpace {
                space: &space,
                name,
            })
            .await?;
        }
        self.store.spaces().update(id, input).await
    }

    /// Deletes a space; with `recursive`, its apps, service instances,
    /// routes and bindings go in the same transaction.
    pub async fn delete_space(
        &self,
        perms: &Permissions,
        id: Uuid,
        recursive: bool,
    ) -> NimbusResult<DeletedSet> {
        let (space, organization) = self.writable_space(perms, Operation::Delete, id).await?;
        let plan = self
            .planner()
            .plan_space(&organization, &space, recursive)
            .await?;
        let deleted = self.execute_plan(&plan).await?;
        info!(space_id = %id, removed = deleted.len(), "Space deleted");
        Ok(deleted)
    }

    pub async fn list_space_members(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<Vec<SpaceRoleAssignment>> {
        self.visible_space(perms, id).await?;
        self.store.roles().space_members(id).await
    }

    /// Grants a space role to a member of the space's organization.
    pub async fn add_space_role(
        &self,
        perms: &Permissions,
        space_id: Uuid,
        user_id: Uuid,
        role: SpaceRole,
    ) -> NimbusResult<()> {
        let (space, _) = self
            .writable_space(perms, Operation::ManageRoles, space_id)
            .await?;
        self.store.users().get_by_id(user_id).await?;
        self.validate(ProposedChange::GrantSpaceRole {
            space: &space,
            user_id,
        })
        .await?;
        self.store.roles().add_space_role(&space, user_id, role).await
    }

    pub async fn remove_space_role(
        &self,
        perms: &Permissions,
        space_id: Uuid,
        user_id: Uuid,
        role: SpaceRole,
    ) -> NimbusResult<()> {
        self.writable_space(perms, Operation::ManageRoles, space_id)
            .await?;
        self.store
            .roles()
            .remove_space_role(space_id, user_id, role)
            .await
    }
}
