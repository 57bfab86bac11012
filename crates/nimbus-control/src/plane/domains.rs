use nimbus_authz::policy::{Child, Node, Operation, Permissions};
use nimbus_core::error::{ConstraintViolation, NimbusResult};
use nimbus_core::models::domain::{CreateDomain, Domain};
use nimbus_core::repository::{
    DomainRepository, PaginatedResult, Pagination, ResourceStore, RouteRepository,
};
use tracing::info;
use uuid::Uuid;

use super::ControlPlane;
use crate::constraints::ProposedChange;

fn domain_node(domain: &Domain) -> Node {
    Node::Domain {
        owning_organization_id: domain.owning_organization_id(),
    }
}

impl<S: ResourceStore> ControlPlane<S> {
    /// Creates a shared domain (admin) or a private domain owned by an
    /// organization (its managers).
    pub async fn create_domain(&self, perms: &Permissions, input: CreateDomain) -> NimbusResult<Domain> {
        match input.owning_organization_id {
            Some(organization_id) => {
                let organization = self.visible_organization(perms, organization_id).await?;
                perms
                    .authorize(
                        Operation::Create(Child::PrivateDomain),
                        &Node::Organization {
                            id: organization_id,
                        },
                    )
                    .into_result("organization", organization_id)?;
                Self::ensure_writable(perms, &organization)?;
            }
            None => perms
                .authorize(Operation::Create(Child::SharedDomain), &Node::Platform)
                .into_result("domain", &input.name)?,
        }

        self.validate(ProposedChange::CreateDomain { name: &input.name })
            .await?;
        self.store.domains().create(input).await
    }

    /// Makes a domain available to an organization.
    ///
    /// Shared domains and domains the organization already owns are
    /// accepted without change; another organization's private domain is
    /// rejected.
    pub async fn add_domain(
        &self,
        perms: &Permissions,
        organization_id: Uuid,
        domain_id: Uuid,
    ) -> NimbusResult<Domain> {
        let organization = self.visible_organization(perms, organization_id).await?;
        perms
            .authorize(
                Operation::Create(Child::PrivateDomain),
                &Node::Organization {
                    id: organization_id,
                },
            )
            .into_result("organization", organization_id)?;
        Self::ensure_writable(perms, &organization)?;

        let domain = self.store.domains().get_by_id(domain_id).await?;
        self.validate(ProposedChange::AddDomain {
            domain: &domain,
            organization_id,
        })
        .await?;
        info!(%organization_id, %domain_id, "Domain available to organization");
        Ok(domain)
    }

    pub async fn get_domain(&self, perms: &Permissions, id: Uuid) -> NimbusResult<Domain> {
        let domain = self.store.domains().get_by_id(id).await?;
        perms
            .authorize(Operation::Read, &domain_node(&domain))
            .into_result("domain", id)?;
        Ok(domain)
    }

    /// Shared domains plus the private domains of the actor's organizations.
    pub async fn list_domains(
        &self,
        perms: &Permissions,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<Domain>> {
        let domains = if perms.is_global_reader() {
            self.store.domains().list_all().await?
        } else {
            self.store
                .domains()
                .list_usable_by(&perms.member_organization_ids())
                .await?
        };
        Ok(PaginatedResult::from_vec(domains, pagination))
    }

    /// Deletes a domain that no route uses.
    pub async fn delete_domain(&self, perms: &Permissions, id: Uuid) -> NimbusResult<()> {
        let domain = self.store.domains().get_by_id(id).await?;
        perms
            .authorize(Operation::Delete, &domain_node(&domain))
            .into_result("domain", id)?;
        if let Some(owner) = domain.owning_organization_id() {
            let organization = self.visible_organization(perms, owner).await?;
            Self::ensure_writable(perms, &organization)?;
        }

        if self.store.routes().count_by_domain(id).await? > 0 {
            return Err(ConstraintViolation::AssociationNotEmpty {
                entity: "domain".into(),
                id,
                association: "routes".into(),
            }
            .into());
        }
        self.store.domains().delete(id).await
    }
}
