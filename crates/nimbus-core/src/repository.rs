//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Scoped lookups (`list_by_*`)
//! return every matching record ordered by creation time; the control
//! plane filters them for visibility before paginating.

use uuid::Uuid;

use crate::error::NimbusResult;
use crate::models::{
    app::{App, NewApp, UpdateApp},
    deletion::{DeletedSet, DeletionPlan},
    domain::{CreateDomain, Domain},
    organization::{CreateOrganization, Organization, UpdateOrganization},
    quota::{CreateQuotaDefinition, QuotaDefinition, UpdateQuotaDefinition},
    role::{OrgRole, OrgRoleAssignment, SpaceRole, SpaceRoleAssignment, UserRoles},
    route::{CreateRoute, Route},
    security_group::{
        CreateSecurityGroup, Lifecycle, SecurityGroup, SecurityGroupRelationships,
        UpdateSecurityGroup,
    },
    service_instance::{NewServiceInstance, ServiceBinding, ServiceInstance, ServiceInstanceChanges},
    service_plan_visibility::{CreateServicePlanVisibility, ServicePlanVisibility},
    space::{CreateSpace, Space, UpdateSpace},
    usage_event::{NewUsageEvent, UsageEvent},
    user::{CreateUser, User},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> PaginatedResult<T> {
    /// Paginates an already-filtered, already-ordered collection.
    pub fn from_vec(items: Vec<T>, pagination: Pagination) -> Self {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(usize::try_from(pagination.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(pagination.limit).unwrap_or(usize::MAX))
            .collect();
        Self {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Organizations & spaces
// ---------------------------------------------------------------------------

pub trait OrganizationRepository: Send + Sync {
    /// Creates the organization; `manager_id`, when given, is granted the
    /// `user` and `manager` roles in the same transaction.
    fn create(
        &self,
        input: CreateOrganization,
        manager_id: Option<Uuid>,
    ) -> impl Future<Output = NimbusResult<Organization>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<Organization>> + Send;
    fn find_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = NimbusResult<Option<Organization>>> + Send;
    /// Applies field changes and, when `manager_ids` is set, replaces the
    /// manager set. Both commit together; emptying a non-empty manager set
    /// is refused by the storage transaction itself.
    fn update(
        &self,
        id: Uuid,
        input: UpdateOrganization,
    ) -> impl Future<Output = NimbusResult<Organization>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = NimbusResult<PaginatedResult<Organization>>> + Send;
    fn list_by_ids(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<Organization>>> + Send;
    fn count_by_quota(&self, quota_definition_id: Uuid)
    -> impl Future<Output = NimbusResult<u64>> + Send;
}

pub trait SpaceRepository: Send + Sync {
    fn create(&self, input: CreateSpace) -> impl Future<Output = NimbusResult<Space>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<Space>> + Send;
    fn find_by_name(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> impl Future<Output = NimbusResult<Option<Space>>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateSpace,
    ) -> impl Future<Output = NimbusResult<Space>> + Send;
    fn list_by_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = NimbusResult<Vec<Space>>> + Send;
    fn list_by_ids(&self, ids: &[Uuid]) -> impl Future<Output = NimbusResult<Vec<Space>>> + Send;
    fn list_all(&self) -> impl Future<Output = NimbusResult<Vec<Space>>> + Send;
}

// ---------------------------------------------------------------------------
// Space children
// ---------------------------------------------------------------------------

/// `create` and `update` write the given usage events in the same
/// transaction as the app itself.
pub trait AppRepository: Send + Sync {
    fn create(
        &self,
        input: NewApp,
        events: Vec<NewUsageEvent>,
    ) -> impl Future<Output = NimbusResult<App>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<App>> + Send;
    fn find_by_name(
        &self,
        space_id: Uuid,
        name: &str,
    ) -> impl Future<Output = NimbusResult<Option<App>>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateApp,
        events: Vec<NewUsageEvent>,
    ) -> impl Future<Output = NimbusResult<App>> + Send;
    fn list_by_spaces(
        &self,
        space_ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<App>>> + Send;
    /// Memory held by started apps across the organization's spaces.
    fn started_memory_mb(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = NimbusResult<u64>> + Send;
}

/// Like [`AppRepository`], writes go in one transaction with their usage
/// events.
pub trait ServiceInstanceRepository: Send + Sync {
    fn create(
        &self,
        input: NewServiceInstance,
        events: Vec<NewUsageEvent>,
    ) -> impl Future<Output = NimbusResult<ServiceInstance>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<ServiceInstance>> + Send;
    fn find_by_name(
        &self,
        space_id: Uuid,
        name: &str,
    ) -> impl Future<Output = NimbusResult<Option<ServiceInstance>>> + Send;
    fn update(
        &self,
        id: Uuid,
        changes: ServiceInstanceChanges,
        events: Vec<NewUsageEvent>,
    ) -> impl Future<Output = NimbusResult<ServiceInstance>> + Send;
    fn list_by_spaces(
        &self,
        space_ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<ServiceInstance>>> + Send;
    fn count_by_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = NimbusResult<u64>> + Send;
}

pub trait ServiceBindingRepository: Send + Sync {
    /// Fails with `DuplicateName` when the pair is already bound.
    fn create(
        &self,
        app_id: Uuid,
        service_instance_id: Uuid,
        space_id: Uuid,
    ) -> impl Future<Output = NimbusResult<ServiceBinding>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<ServiceBinding>> + Send;
    fn list_by_spaces(
        &self,
        space_ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<ServiceBinding>>> + Send;
    fn list_by_app(
        &self,
        app_id: Uuid,
    ) -> impl Future<Output = NimbusResult<Vec<ServiceBinding>>> + Send;
    fn list_by_service_instance(
        &self,
        service_instance_id: Uuid,
    ) -> impl Future<Output = NimbusResult<Vec<ServiceBinding>>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = NimbusResult<()>> + Send;
}

pub trait RouteRepository: Send + Sync {
    fn create(&self, input: CreateRoute) -> impl Future<Output = NimbusResult<Route>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<Route>> + Send;
    fn find(
        &self,
        domain_id: Uuid,
        host: &str,
        path: &str,
    ) -> impl Future<Output = NimbusResult<Option<Route>>> + Send;
    fn list_by_spaces(
        &self,
        space_ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<Route>>> + Send;
    fn count_by_domain(&self, domain_id: Uuid) -> impl Future<Output = NimbusResult<u64>> + Send;
    fn count_by_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = NimbusResult<u64>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = NimbusResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Platform-level resources
// ---------------------------------------------------------------------------

pub trait DomainRepository: Send + Sync {
    fn create(&self, input: CreateDomain) -> impl Future<Output = NimbusResult<Domain>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<Domain>> + Send;
    fn find_by_name(&self, name: &str)
    -> impl Future<Output = NimbusResult<Option<Domain>>> + Send;
    /// Every shared domain plus the private domains of the given owners.
    fn list_usable_by(
        &self,
        organization_ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<Domain>>> + Send;
    fn list_all(&self) -> impl Future<Output = NimbusResult<Vec<Domain>>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = NimbusResult<()>> + Send;
}

pub trait SecurityGroupRepository: Send + Sync {
    fn create(
        &self,
        input: CreateSecurityGroup,
    ) -> impl Future<Output = NimbusResult<SecurityGroup>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<SecurityGroup>> + Send;
    fn find_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = NimbusResult<Option<SecurityGroup>>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateSecurityGroup,
    ) -> impl Future<Output = NimbusResult<SecurityGroup>> + Send;
    /// Deletes the group together with its space bindings.
    fn delete(&self, id: Uuid) -> impl Future<Output = NimbusResult<()>> + Send;
    fn list_all(&self) -> impl Future<Output = NimbusResult<Vec<SecurityGroup>>> + Send;
    fn relationships(
        &self,
        id: Uuid,
    ) -> impl Future<Output = NimbusResult<SecurityGroupRelationships>> + Send;
    /// Ids of groups bound, under either lifecycle, to any of the spaces.
    fn ids_bound_to_spaces(
        &self,
        space_ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<Uuid>>> + Send;
    /// Idempotent.
    fn bind_space(
        &self,
        id: Uuid,
        space_id: Uuid,
        lifecycle: Lifecycle,
    ) -> impl Future<Output = NimbusResult<()>> + Send;
    fn unbind_space(
        &self,
        id: Uuid,
        space_id: Uuid,
        lifecycle: Lifecycle,
    ) -> impl Future<Output = NimbusResult<()>> + Send;
}

pub trait QuotaDefinitionRepository: Send + Sync {
    fn create(
        &self,
        input: CreateQuotaDefinition,
    ) -> impl Future<Output = NimbusResult<QuotaDefinition>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<QuotaDefinition>> + Send;
    fn find_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = NimbusResult<Option<QuotaDefinition>>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateQuotaDefinition,
    ) -> impl Future<Output = NimbusResult<QuotaDefinition>> + Send;
    fn list_all(&self) -> impl Future<Output = NimbusResult<Vec<QuotaDefinition>>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = NimbusResult<()>> + Send;
}

pub trait ServicePlanVisibilityRepository: Send + Sync {
    fn create(
        &self,
        input: CreateServicePlanVisibility,
    ) -> impl Future<Output = NimbusResult<ServicePlanVisibility>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = NimbusResult<ServicePlanVisibility>> + Send;
    fn list_by_organizations(
        &self,
        organization_ids: &[Uuid],
    ) -> impl Future<Output = NimbusResult<Vec<ServicePlanVisibility>>> + Send;
    fn list_all(&self) -> impl Future<Output = NimbusResult<Vec<ServicePlanVisibility>>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = NimbusResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Identity & roles
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = NimbusResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = NimbusResult<User>> + Send;
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = NimbusResult<Option<User>>> + Send;
}

pub trait RoleRepository: Send + Sync {
    /// Grants an organization role. Any role other than `user` also grants
    /// `user`. Granting a role the user already holds is a no-op.
    fn add_org_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> impl Future<Output = NimbusResult<()>> + Send;
    /// Revokes one organization role. Revoking the last manager fails
    /// with `LastManagerRemoval`.
    fn remove_org_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> impl Future<Output = NimbusResult<()>> + Send;
    fn org_role_holders(
        &self,
        organization_id: Uuid,
        role: OrgRole,
    ) -> impl Future<Output = NimbusResult<Vec<Uuid>>> + Send;
    fn org_members(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = NimbusResult<Vec<OrgRoleAssignment>>> + Send;

    /// Idempotent.
    fn add_space_role(
        &self,
        space: &Space,
        user_id: Uuid,
        role: SpaceRole,
    ) -> impl Future<Output = NimbusResult<()>> + Send;
    fn remove_space_role(
        &self,
        space_id: Uuid,
        user_id: Uuid,
        role: SpaceRole,
    ) -> impl Future<Output = NimbusResult<()>> + Send;
    fn space_members(
        &self,
        space_id: Uuid,
    ) -> impl Future<Output = NimbusResult<Vec<SpaceRoleAssignment>>> + Send;

    fn roles_for_user(&self, user_id: Uuid) -> impl Future<Output = NimbusResult<UserRoles>> + Send;

    /// Removes the user's organization-level roles. Without `recursive`,
    /// fails with `AssociationNotEmpty` while the user holds any role in a
    /// space of the organization; with it, those space roles are stripped
    /// first. Either way the change is a single transaction.
    fn remove_user_from_organization(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        recursive: bool,
    ) -> impl Future<Output = NimbusResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Usage events & cascades
// ---------------------------------------------------------------------------

/// Where lifecycle notifications are delivered.
///
/// App, service instance and cascade writes commit their own events; `record`
/// appends one on its own.
pub trait UsageEventSink: Send + Sync {
    fn record(&self, event: NewUsageEvent) -> impl Future<Output = NimbusResult<UsageEvent>> + Send;
}

pub trait UsageEventRepository: UsageEventSink {
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = NimbusResult<PaginatedResult<UsageEvent>>> + Send;
    fn list_for_resource(
        &self,
        resource_id: Uuid,
    ) -> impl Future<Output = NimbusResult<Vec<UsageEvent>>> + Send;
}

pub trait CascadeRepository: Send + Sync {
    /// Records the plan's usage events and removes every planned row in
    /// one transaction. Fails with `Conflict` if the subtree changed since
    /// the plan was made.
    fn execute(&self, plan: &DeletionPlan) -> impl Future<Output = NimbusResult<DeletedSet>> + Send;
}

/// Every repository the control plane needs, behind one handle.
pub trait ResourceStore: Send + Sync {
    type Organizations: OrganizationRepository;
    type Spaces: SpaceRepository;
    type Apps: AppRepository;
    type ServiceInstances: ServiceInstanceRepository;
    type ServiceBindings: ServiceBindingRepository;
    type Routes: RouteRepository;
    type Domains: DomainRepository;
    type SecurityGroups: SecurityGroupRepository;
    type Quotas: QuotaDefinitionRepository;
    type PlanVisibilities: ServicePlanVisibilityRepository;
    type Users: UserRepository;
    type Roles: RoleRepository;
    type UsageEvents: UsageEventRepository;
    type Cascades: CascadeRepository;

    fn organizations(&self) -> &Self::Organizations;
    fn spaces(&self) -> &Self::Spaces;
    fn apps(&self) -> &Self::Apps;
    fn service_instances(&self) -> &Self::ServiceInstances;
    fn service_bindings(&self) -> &Self::ServiceBindings;
    fn routes(&self) -> &Self::Routes;
    fn domains(&self) -> &Self::Domains;
    fn security_groups(&self) -> &Self::SecurityGroups;
    fn quotas(&self) -> &Self::Quotas;
    fn plan_visibilities(&self) -> &Self::PlanVisibilities;
    fn users(&self) -> &Self::Users;
    fn roles(&self) -> &Self::Roles;
    fn usage_events(&self) -> &Self::UsageEvents;
    fn cascades(&self) -> &Self::Cascades;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_paginates_after_filtering() {
        let page = PaginatedResult::from_vec((0..10).collect(), Pagination { offset: 8, limit: 5 });
        assert_eq!(page.items, vec![8, 9]);
        assert_eq!(page.total, 10);
    }
}
