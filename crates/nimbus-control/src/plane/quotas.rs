//! Quota definitions and service plan visibilities.

use nimbus_authz::policy::{Child, Node, Operation, Permissions};
use nimbus_core::error::{ConstraintViolation, NimbusResult};
use nimbus_core::models::quota::{CreateQuotaDefinition, QuotaDefinition, UpdateQuotaDefinition};
use nimbus_core::models::service_plan_visibility::{
    CreateServicePlanVisibility, ServicePlanVisibility,
};
use nimbus_core::repository::{
    OrganizationRepository, PaginatedResult, Pagination, QuotaDefinitionRepository,
    ResourceStore, ServicePlanVisibilityRepository,
};
use uuid::Uuid;

use super::ControlPlane;
use crate::constraints::ProposedChange;

impl<S: ResourceStore> ControlPlane<S> {
    pub async fn create_quota_definition(
        &self,
        perms: &Permissions,
        input: CreateQuotaDefinition,
    ) -> NimbusResult<QuotaDefinition> {
        perms
            .authorize(Operation::Create(Child::QuotaDefinition), &Node::Platform)
            .into_result("quota definition", &input.name)?;
        self.validate(ProposedChange::CreateQuota { name: &input.name })
            .await?;
        self.store.quotas().create(input).await
    }

    pub async fn get_quota_definition(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<QuotaDefinition> {
        perms
            .authorize(Operation::Read, &Node::QuotaDefinition)
            .into_result("quota definition", id)?;
        self.store.quotas().get_by_id(id).await
    }

    /// Every quota definition; they are visible to all authenticated actors.
    pub async fn list_quota_definitions(
        &self,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<QuotaDefinition>> {
        let quotas = self.store.quotas().list_all().await?;
        Ok(PaginatedResult::from_vec(quotas, pagination))
    }

    pub async fn update_quota_definition(
        &self,
        perms: &Permissions,
        id: Uuid,
        input: UpdateQuotaDefinition,
    ) -> NimbusResult<QuotaDefinition> {
        perms
            .authorize(Operation::Update, &Node::QuotaDefinition)
            .into_result("quota definition", id)?;
        self.store.quotas().get_by_id(id).await?;
        if let Some(name) = &input.name {
            self.validate(ProposedChange::RenameQuota {
                quota_definition_id: id,
                name,
            })
            .await?;
        }
        self.store.quotas().update(id, input).await
    }

    /// Deletes a quota definition no organization is assigned to.
    pub async fn delete_quota_definition(&self, perms: &Permissions, id: Uuid) -> NimbusResult<()> {
        perms
            .authorize(Operation::Delete, &Node::QuotaDefinition)
            .into_result("quota definition", id)?;
        self.store.quotas().get_by_id(id).await?;
        if self.store.organizations().count_by_quota(id).await? > 0 {
            return Err(ConstraintViolation::AssociationNotEmpty {
                entity: "quota definition".into(),
                id,
                association: "organizations".into(),
            }
            .into());
        }
        self.store.quotas().delete(id).await
    }

    /// Makes a service plan available to an organization. Admin only.
    pub async fn create_service_plan_visibility(
        &self,
        perms: &Permissions,
        input: CreateServicePlanVisibility,
    ) -> NimbusResult<ServicePlanVisibility> {
        perms
            .authorize(
                Operation::Create(Child::ServicePlanVisibility),
                &Node::Platform,
            )
            .into_result("service plan visibility", input.service_plan_id)?;
        self.store
            .organizations()
            .get_by_id(input.organization_id)
            .await?;
        self.store.plan_visibilities().create(input).await
    }

    pub async fn get_service_plan_visibility(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<ServicePlanVisibility> {
        let visibility = self.store.plan_visibilities().get_by_id(id).await?;
        perms
            .authorize(
                Operation::Read,
                &Node::ServicePlanVisibility {
                    organization_id: visibility.organization_id,
                },
            )
            .into_result("service plan visibility", id)?;
        Ok(visibility)
    }

    pub async fn list_service_plan_visibilities(
        &self,
        perms: &Permissions,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<ServicePlanVisibility>> {
        let visibilities = if perms.is_global_reader() {
            self.store.plan_visibilities().list_all().await?
        } else {
            self.store
                .plan_visibilities()
                .list_by_organizations(&perms.member_organization_ids())
                .await?
                .into_iter()
                .filter(|v| {
                    perms.can_read(&Node::ServicePlanVisibility {
                        organization_id: v.organization_id,
                    })
                })
                .collect()
        };
        Ok(PaginatedResult::from_vec(visibilities, pagination))
    }

    pub async fn delete_service_plan_visibility(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<()> {
        let visibility = self.get_service_plan_visibility(perms, id).await?;
        perms
            .authorize(
                Operation::Delete,
                &Node::ServicePlanVisibility {
                    organization_id: visibility.organization_id,
                },
            )
            .into_result("service plan visibility", id)?;
        self.store.plan_visibilities().delete(id).await
    }
}
