//! Security groups and their staging/running space bindings.

use std::collections::BTreeSet;

use nimbus_authz::policy::{Child, Node, Operation, Permissions};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::security_group::{
    CreateSecurityGroup, Lifecycle, SecurityGroup, SecurityGroupRelationships,
    UpdateSecurityGroup,
};
use nimbus_core::repository::{
    PaginatedResult, Pagination, ResourceStore, SecurityGroupRepository, SpaceRepository,
};
use tracing::info;
use uuid::Uuid;

use super::ControlPlane;
use crate::constraints::ProposedChange;

fn group_node(group: &SecurityGroup, relationships: &SecurityGroupRelationships) -> Node {
    Node::SecurityGroup {
        globally_enabled: group.globally_enabled,
        space_ids: relationships.all_space_ids(),
    }
}

impl<S: ResourceStore> ControlPlane<S> {
    pub async fn create_security_group(
        &self,
        perms: &Permissions,
        input: CreateSecurityGroup,
    ) -> NimbusResult<SecurityGroup> {
        perms
            .authorize(Operation::Create(Child::SecurityGroup), &Node::Platform)
            .into_result("security group", &input.name)?;
        self.validate(ProposedChange::CreateSecurityGroup {
            name: &input.name,
            rules: &input.rules,
        })
        .await?;
        self.store.security_groups().create(input).await
    }

    /// Loads a group with its bindings and checks `operation` on it.
    async fn authorized_group(
        &self,
        perms: &Permissions,
        operation: Operation,
        id: Uuid,
    ) -> NimbusResult<(SecurityGroup, SecurityGroupRelationships)> {
        let group = self.store.security_groups().get_by_id(id).await?;
        let relationships = self.store.security_groups().relationships(id).await?;
        perms
            .authorize(operation, &group_node(&group, &relationships))
            .into_result("security group", id)?;
        Ok((group, relationships))
    }

    pub async fn get_security_group(&self, perms: &Permissions, id: Uuid) -> NimbusResult<SecurityGroup> {
        Ok(self.authorized_group(perms, Operation::Read, id).await?.0)
    }

    /// Identifier-only view of the group's space bindings.
    pub async fn security_group_relationships(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<SecurityGroupRelationships> {
        Ok(self.authorized_group(perms, Operation::Read, id).await?.1)
    }

    /// Globally enabled groups plus those bound to the actor's spaces.
    pub async fn list_security_groups(
        &self,
        perms: &Permissions,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<SecurityGroup>> {
        let groups = self.store.security_groups().list_all().await?;
        if perms.is_global_reader() {
            return Ok(PaginatedResult::from_vec(groups, pagination));
        }
        let bound: BTreeSet<Uuid> = self
            .store
            .security_groups()
            .ids_bound_to_spaces(&perms.space_ids())
            .await?
            .into_iter()
            .collect();
        let visible = groups
            .into_iter()
            .filter(|g| g.globally_enabled.any() || bound.contains(&g.id))
            .collect();
        Ok(PaginatedResult::from_vec(visible, pagination))
    }

    pub async fn update_security_group(
        &self,
        perms: &Permissions,
        id: Uuid,
        input: UpdateSecurityGroup,
    ) -> NimbusResult<SecurityGroup> {
        self.authorized_group(perms, Operation::Update, id).await?;
        self.validate(ProposedChange::UpdateSecurityGroup {
            security_group_id: id,
            name: input.name.as_deref(),
            rules: input.rules.as_deref(),
        })
        .await?;
        self.store.security_groups().update(id, input).await
    }

    pub async fn delete_security_group(&self, perms: &Permissions, id: Uuid) -> NimbusResult<()> {
        self.authorized_group(perms, Operation::Delete, id).await?;
        self.store.security_groups().delete(id).await
    }

    /// Applies the group to a space for one lifecycle. Idempotent.
    pub async fn bind_security_group(
        &self,
        perms: &Permissions,
        id: Uuid,
        space_id: Uuid,
        lifecycle: Lifecycle,
    ) -> NimbusResult<()> {
        self.authorized_group(perms, Operation::Update, id).await?;
        self.store.spaces().get_by_id(space_id).await?;
        self.store
            .security_groups()
            .bind_space(id, space_id, lifecycle)
            .await?;
        info!(security_group_id = %id, %space_id, ?lifecycle, "Security group bound");
        Ok(())
    }

    pub async fn unbind_security_group(
        &self,
        perms: &Permissions,
        id: Uuid,
        space_id: Uuid,
        lifecycle: Lifecycle,
    ) -> NimbusResult<()> {
        self.authorized_group(perms, Operation::Update, id).await?;
        self.store
            .security_groups()
            .unbind_space(id, space_id, lifecycle)
            .await
    }
}
