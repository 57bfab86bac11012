//! SurrealDB repository implementations.

mod app;
mod cascade;
mod domain;
mod organization;
mod quota;
mod role;
mod route;
mod security_group;
mod service_binding;
mod service_instance;
mod service_plan_visibility;
mod space;
mod usage_event;
mod user;

use surrealdb_types::SurrealValue;

pub use app::SurrealAppRepository;
pub use cascade::SurrealCascadeRepository;
pub use domain::SurrealDomainRepository;
pub use organization::SurrealOrganizationRepository;
pub use quota::SurrealQuotaDefinitionRepository;
pub use role::SurrealRoleRepository;
pub use route::SurrealRouteRepository;
pub use security_group::SurrealSecurityGroupRepository;
pub use service_binding::SurrealServiceBindingRepository;
pub use service_instance::SurrealServiceInstanceRepository;
pub use service_plan_visibility::SurrealServicePlanVisibilityRepository;
pub use space::SurrealSpaceRepository;
pub use usage_event::SurrealUsageEventRepository;
pub use user::SurrealUserRepository;

/// Result row of `SELECT count() AS total ... GROUP ALL`.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// `GROUP ALL` yields no row at all for an empty table.
pub(crate) fn total(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}
