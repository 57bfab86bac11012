//! [`ResourceStore`] over one SurrealDB connection.

use nimbus_core::repository::ResourceStore;
use surrealdb::{Connection, Surreal};

use crate::repository::{
    SurrealAppRepository, SurrealCascadeRepository, SurrealDomainRepository,
    SurrealOrganizationRepository, SurrealQuotaDefinitionRepository, SurrealRoleRepository,
    SurrealRouteRepository, SurrealSecurityGroupRepository, SurrealServiceBindingRepository,
    SurrealServiceInstanceRepository, SurrealServicePlanVisibilityRepository,
    SurrealSpaceRepository, SurrealUsageEventRepository, SurrealUserRepository,
};

/// Every SurrealDB repository, sharing one client.
#[derive(Clone)]
pub struct SurrealStore<C: Connection> {
    organizations: SurrealOrganizationRepository<C>,
    spaces: SurrealSpaceRepository<C>,
    apps: SurrealAppRepository<C>,
    service_instances: SurrealServiceInstanceRepository<C>,
    service_bindings: SurrealServiceBindingRepository<C>,
    routes: SurrealRouteRepository<C>,
    domains: SurrealDomainRepository<C>,
    security_groups: SurrealSecurityGroupRepository<C>,
    quotas: SurrealQuotaDefinitionRepository<C>,
    plan_visibilities: SurrealServicePlanVisibilityRepository<C>,
    users: SurrealUserRepository<C>,
    roles: SurrealRoleRepository<C>,
    usage_events: SurrealUsageEventRepository<C>,
    cascades: SurrealCascadeRepository<C>,
}

impl<C: Connection> SurrealStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            organizations: SurrealOrganizationRepository::new(db.clone()),
            spaces: SurrealSpaceRepository::new(db.clone()),
            apps: SurrealAppRepository::new(db.clone()),
            service_instances: SurrealServiceInstanceRepository::new(db.clone()),
            service_bindings: SurrealServiceBindingRepository::new(db.clone()),
            routes: SurrealRouteRepository::new(db.clone()),
            domains: SurrealDomainRepository::new(db.clone()),
            security_groups: SurrealSecurityGroupRepository::new(db.clone()),
            quotas: SurrealQuotaDefinitionRepository::new(db.clone()),
            plan_visibilities: SurrealServicePlanVisibilityRepository::new(db.clone()),
            users: SurrealUserRepository::new(db.clone()),
            roles: SurrealRoleRepository::new(db.clone()),
            usage_events: SurrealUsageEventRepository::new(db.clone()),
            cascades: SurrealCascadeRepository::new(db),
        }
    }
}

impl<C: Connection> ResourceStore for SurrealStore<C> {
    type Organizations = SurrealOrganizationRepository<C>;
    type Spaces = SurrealSpaceRepository<C>;
    type Apps = SurrealAppRepository<C>;
    type ServiceInstances = SurrealServiceInstanceRepository<C>;
    type ServiceBindings = SurrealServiceBindingRepository<C>;
    type Routes = SurrealRouteRepository<C>;
    type Domains = SurrealDomainRepository<C>;
    type SecurityGroups = SurrealSecurityGroupRepository<C>;
    type Quotas = SurrealQuotaDefinitionRepository<C>;
    type PlanVisibilities = SurrealServicePlanVisibilityRepository<C>;
    type Users = SurrealUserRepository<C>;
    type Roles = SurrealRoleRepository<C>;
    type UsageEvents = SurrealUsageEventRepository<C>;
    type Cascades = SurrealCascadeRepository<C>;

    fn organizations(&self) -> &Self::Organizations {
        &self.organizations
    }
    fn spaces(&self) -> &Self::Spaces {
        &self.spaces
    }
    fn apps(&self) -> &Self::Apps {
        &self.apps
    }
    fn service_instances(&self) -> &Self::ServiceInstances {
        &self.service_instances
    }
    fn service_bindings(&self) -> &Self::ServiceBindings {
        &self.service_bindings
    }
    fn routes(&self) -> &Self::Routes {
        &self.routes
    }
    fn domains(&self) -> &Self::Domains {
        &self.domains
    }
    fn security_groups(&self) -> &Self::SecurityGroups {
        &self.security_groups
    }
    fn quotas(&self) -> &Self::Quotas {
        &self.quotas
    }
    fn plan_visibilities(&self) -> &Self::PlanVisibilities {
        &self.plan_visibilities
    }
    fn users(&self) -> &Self::Users {
        &self.users
    }
    fn roles(&self) -> &Self::Roles {
        &self.roles
    }
    fn usage_events(&self) -> &Self::UsageEvents {
        &self.usage_events
    }
    fn cascades(&self) -> &Self::Cascades {
        &self.cascades
    }
}
