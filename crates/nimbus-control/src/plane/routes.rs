use nimbus_authz::policy::{Child, Operation, Permissions};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::route::{CreateRoute, Route};
use nimbus_core::repository::{
    DomainRepository, PaginatedResult, Pagination, ResourceStore, RouteRepository,
};
use uuid::Uuid;

use super::{ControlPlane, space_node};
use crate::constraints::ProposedChange;

impl<S: ResourceStore> ControlPlane<S> {
    /// Creates a route on a domain usable by the space's organization.
    pub async fn create_route(&self, perms: &Permissions, input: CreateRoute) -> NimbusResult<Route> {
        let (space, organization) = self.visible_space(perms, input.space_id).await?;
        perms
            .authorize(Operation::Create(Child::Route), &space_node(&space))
            .into_result("space", space.id)?;
        Self::ensure_writable(perms, &organization)?;

        let domain = self.store.domains().get_by_id(input.domain_id).await?;
        let path = input.path.clone().unwrap_or_default();
        self.validate(ProposedChange::CreateRoute {
            organization: &organization,
            domain: &domain,
            host: &input.host,
            path: &path,
        })
        .await?;

        self.store
            .routes()
            .create(CreateRoute {
                path: Some(path),
                ..input
            })
            .await
    }

    pub async fn get_route(&self, perms: &Permissions, id: Uuid) -> NimbusResult<Route> {
        let route = self.store.routes().get_by_id(id).await?;
        self.authorize_in_space(perms, Operation::Read, "route", id, route.space_id)
            .await?;
        Ok(route)
    }

    pub async fn list_routes(
        &self,
        perms: &Permissions,
        space_id: Option<Uuid>,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<Route>> {
        let scope = self.listing_scope(perms, space_id).await?;
        let routes = self.store.routes().list_by_spaces(&scope).await?;
        Ok(PaginatedResult::from_vec(routes, pagination))
    }

    pub async fn delete_route(&self, perms: &Permissions, id: Uuid) -> NimbusResult<()> {
        let route = self.store.routes().get_by_id(id).await?;
        self.authorize_in_space(perms, Operation::Delete, "route", id, route.space_id)
            .await?;
        self.store.routes().delete(id).await
    }
}
