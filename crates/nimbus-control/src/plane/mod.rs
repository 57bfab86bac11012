//! The control plane: the single entry point for every operation on the
//! resource graph.
//!
//! Each operation runs the same pipeline: authorize against the actor's
//! [`Permissions`], validate through the [`ConstraintEngine`], then mutate
//! the store together with the usage events the change produces. Deletions go through the
//! [`DeletionPlanner`] and the store's transactional cascade executor.

mod apps;
mod domains;
mod organizations;
mod quotas;
mod routes;
mod security_groups;
mod seed;
mod services;
mod spaces;

use std::collections::BTreeSet;

use nimbus_authz::policy::{Node, Operation, Permissions};
use nimbus_core::error::{ConstraintViolation, NimbusError, NimbusResult};
use nimbus_core::models::deletion::{DeletedSet, DeletionPlan};
use nimbus_core::models::organization::Organization;
use nimbus_core::models::space::Space;
use nimbus_core::models::usage_event::UsageEvent;
use nimbus_core::repository::{
    CascadeRepository, OrganizationRepository, PaginatedResult, Pagination, ResourceStore,
    SpaceRepository, UsageEventRepository,
};
use uuid::Uuid;

use crate::cascade::DeletionPlanner;
use crate::config::ControlConfig;
use crate::constraints::{ConstraintEngine, ProposedChange};
use crate::credentials::CredentialCipher;
use crate::usage::UsageEventEmitter;

pub use seed::SeedReport;

/// Orchestrates authorization, constraints, storage and usage events.
///
/// Holds no mutable state; share it behind an `Arc`.
pub struct ControlPlane<S: ResourceStore> {
    store: S,
    config: ControlConfig,
    emitter: UsageEventEmitter,
    cipher: CredentialCipher,
}

impl<S: ResourceStore> ControlPlane<S> {
    pub fn new(store: S, config: ControlConfig) -> Self {
        Self {
            emitter: UsageEventEmitter::new(config.billing_event_writing_enabled),
            cipher: CredentialCipher::new(config.credentials_key),
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    fn constraints(&self) -> ConstraintEngine<'_, S> {
        ConstraintEngine::new(&self.store)
    }

    async fn validate(&self, change: ProposedChange<'_>) -> NimbusResult<()> {
        self.constraints().validate(&change).await
    }

    fn planner(&self) -> DeletionPlanner<'_, S> {
        DeletionPlanner::new(&self.store, self.emitter)
    }

    async fn execute_plan(&self, plan: &DeletionPlan) -> NimbusResult<DeletedSet> {
        self.store.cascades().execute(plan).await
    }

    /// Suspended organizations only accept writes from admins.
    fn ensure_writable(perms: &Permissions, organization: &Organization) -> NimbusResult<()> {
        if organization.is_suspended() && !perms.is_admin() {
            return Err(ConstraintViolation::OrganizationSuspended {
                organization_id: organization.id,
            }
            .into());
        }
        Ok(())
    }

    /// Loads an organization the actor can see.
    async fn visible_organization(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<Organization> {
        let organization = self.store.organizations().get_by_id(id).await?;
        perms
            .authorize(Operation::Read, &Node::Organization { id })
            .into_result("organization", id)?;
        Ok(organization)
    }

    /// Loads a space the actor can see, with its organization.
    async fn visible_space(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<(Space, Organization)> {
        let space = self.store.spaces().get_by_id(id).await?;
        perms
            .authorize(Operation::Read, &space_node(&space))
            .into_result("space", id)?;
        let organization = self
            .store
            .organizations()
            .get_by_id(space.organization_id)
            .await?;
        Ok((space, organization))
    }

    /// Loads the space owning a space resource and checks `operation` on
    /// the resource.
    async fn authorize_in_space(
        &self,
        perms: &Permissions,
        operation: Operation,
        entity: &str,
        id: Uuid,
        space_id: Uuid,
    ) -> NimbusResult<(Space, Organization)> {
        let space = self.store.spaces().get_by_id(space_id).await?;
        let node = Node::SpaceResource {
            space_id,
            organization_id: space.organization_id,
        };
        perms.authorize(Operation::Read, &node).into_result(entity, id)?;
        let organization = self
            .store
            .organizations()
            .get_by_id(space.organization_id)
            .await?;
        if operation != Operation::Read {
            perms.authorize(operation, &node).into_result(entity, id)?;
            Self::ensure_writable(perms, &organization)?;
        }
        Ok((space, organization))
    }

    /// Spaces whose contents the actor can see.
    async fn visible_space_ids(&self, perms: &Permissions) -> NimbusResult<Vec<Uuid>> {
        if perms.is_global_reader() {
            return Ok(self
                .store
                .spaces()
                .list_all()
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect());
        }
        let mut ids: BTreeSet<Uuid> = perms.space_ids().into_iter().collect();
        for organization_id in perms.managed_organization_ids() {
            let spaces = self.store.spaces().list_by_organization(organization_id).await?;
            ids.extend(spaces.into_iter().map(|s| s.id));
        }
        Ok(ids.into_iter().collect())
    }

    /// Spaces to list children of: one visible space, or every visible one.
    async fn listing_scope(
        &self,
        perms: &Permissions,
        space_id: Option<Uuid>,
    ) -> NimbusResult<Vec<Uuid>> {
        match space_id {
            Some(id) => {
                self.visible_space(perms, id).await?;
                Ok(vec![id])
            }
            None => self.visible_space_ids(perms).await,
        }
    }

    /// The platform usage event log, for global readers.
    pub async fn list_usage_events(
        &self,
        perms: &Permissions,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<UsageEvent>> {
        if !perms.can_read(&Node::UsageEvent) {
            return Err(NimbusError::Forbidden {
                reason: "usage events are visible to global roles only".into(),
            });
        }
        self.store.usage_events().list(pagination).await
    }
}

fn space_node(space: &Space) -> Node {
    Node::Space {
        id: space.id,
        organization_id: space.organization_id,
    }
}
