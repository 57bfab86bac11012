//! Constraint engine.
//!
//! Every mutation is described as a [`ProposedChange`] and validated before
//! it reaches storage. Rules run in a fixed order per change (format, then
//! uniqueness, then referential and domain invariants) and the first
//! failure is returned. Storage re-checks uniqueness through its indexes
//! and the manager floor inside its transactions; these checks give the
//! caller a precise error before anything is written.

use std::collections::BTreeSet;

use nimbus_core::error::{ConstraintViolation, NimbusError, NimbusResult, ValidationError};
use nimbus_core::models::app::App;
use nimbus_core::models::domain::Domain;
use nimbus_core::models::organization::Organization;
use nimbus_core::models::role::OrgRole;
use nimbus_core::models::security_group::SecurityGroupRule;
use nimbus_core::models::service_instance::ServiceInstance;
use nimbus_core::models::space::Space;
use nimbus_core::repository::{
    AppRepository, DomainRepository, OrganizationRepository, QuotaDefinitionRepository,
    ResourceStore, RoleRepository, RouteRepository, SecurityGroupRepository,
    ServiceInstanceRepository, SpaceRepository, UserRepository,
};
use nimbus_core::validation;
use tracing::debug;
use uuid::Uuid;

/// A mutation awaiting validation.
#[derive(Debug)]
pub enum ProposedChange<'a> {
    CreateOrganization {
        name: &'a str,
    },
    RenameOrganization {
        organization_id: Uuid,
        name: &'a str,
    },
    /// Replacing the manager set, or revoking a manager role when
    /// `manager_ids` lists the remaining managers.
    SetOrganizationManagers {
        organization_id: Uuid,
        manager_ids: &'a [Uuid],
    },
    CreateSpace {
        organization_id: Uuid,
        name: &'a str,
    },
    RenameSpace {
        space: &'a Space,
        name: &'a str,
    },
    GrantSpaceRole {
        space: &'a Space,
        user_id: Uuid,
    },
    /// Removing a user from an organization without touching their
    /// space roles.
    RemoveOrganizationUser {
        organization_id: Uuid,
        user_id: Uuid,
    },
    CreateApp {
        space_id: Uuid,
        name: &'a str,
    },
    RenameApp {
        app: &'a App,
        name: &'a str,
    },
    /// An app that is, or will be, started with the given footprint.
    RunApp {
        organization: &'a Organization,
        app_id: Option<Uuid>,
        memory_mb: u64,
        instances: u32,
    },
    CreateServiceInstance {
        organization: &'a Organization,
        space_id: Uuid,
        name: &'a str,
    },
    RenameServiceInstance {
        instance: &'a ServiceInstance,
        name: &'a str,
    },
    CreateServiceBinding {
        app: &'a App,
        instance: &'a ServiceInstance,
    },
    CreateRoute {
        organization: &'a Organization,
        domain: &'a Domain,
        host: &'a str,
        path: &'a str,
    },
    CreateDomain {
        name: &'a str,
    },
    AddDomain {
        domain: &'a Domain,
        organization_id: Uuid,
    },
    CreateSecurityGroup {
        name: &'a str,
        rules: &'a [SecurityGroupRule],
    },
    UpdateSecurityGroup {
        security_group_id: Uuid,
        name: Option<&'a str>,
        rules: Option<&'a [SecurityGroupRule]>,
    },
    CreateQuota {
        name: &'a str,
    },
    RenameQuota {
        quota_definition_id: Uuid,
        name: &'a str,
    },
}

fn duplicate(entity: &str, name: &str) -> NimbusError {
    ValidationError::DuplicateName {
        entity: entity.into(),
        name: name.into(),
    }
    .into()
}

/// Fails with `DuplicateName` when `existing` is some other record.
fn ensure_unique(entity: &str, name: &str, existing: Option<Uuid>, own: Option<Uuid>) -> NimbusResult<()> {
    match existing {
        Some(id) if Some(id) != own => Err(duplicate(entity, name)),
        _ => Ok(()),
    }
}

/// Validates proposed changes against the current resource graph.
pub struct ConstraintEngine<'a, S: ResourceStore> {
    store: &'a S,
}

impl<'a, S: ResourceStore> ConstraintEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn validate(&self, change: &ProposedChange<'_>) -> NimbusResult<()> {
        let result = self.evaluate(change).await;
        if let Err(e) = &result {
            debug!(error = %e, "Proposed change rejected");
        }
        result
    }

    async fn evaluate(&self, change: &ProposedChange<'_>) -> NimbusResult<()> {
        match *change {
            ProposedChange::CreateOrganization { name } => {
                validation::validate_name("organization.name", name)?;
                let existing = self.store.organizations().find_by_name(name).await?;
                ensure_unique("organization", name, existing.map(|o| o.id), None)
            }
            ProposedChange::RenameOrganization {
                organization_id,
                name,
            } => {
                validation::validate_name("organization.name", name)?;
                let existing = self.store.organizations().find_by_name(name).await?;
                ensure_unique(
                    "organization",
                    name,
                    existing.map(|o| o.id),
                    Some(organization_id),
                )
            }
            ProposedChange::SetOrganizationManagers {
                organization_id,
                manager_ids,
            } => {
                let current = self
                    .store
                    .roles()
                    .org_role_holders(organization_id, OrgRole::Manager)
                    .await?;
                let mut proposed = BTreeSet::new();
                for user_id in manager_ids {
                    if proposed.insert(*user_id) {
                        self.store.users().get_by_id(*user_id).await?;
                    }
                }
                validation::check_manager_floor(organization_id, current.len(), proposed.len())?;
                Ok(())
            }
            ProposedChange::CreateSpace {
                organization_id,
                name,
            } => {
                validation::validate_name("space.name", name)?;
                let existing = self.store.spaces().find_by_name(organization_id, name).await?;
                ensure_unique("space", name, existing.map(|s| s.id), None)
            }
            ProposedChange::RenameSpace { space, name } => {
                validation::validate_name("space.name", name)?;
                let existing = self
                    .store
                    .spaces()
                    .find_by_name(space.organization_id, name)
                    .await?;
                ensure_unique("space", name, existing.map(|s| s.id), Some(space.id))
            }
            ProposedChange::GrantSpaceRole { space, user_id } => {
                let members = self.store.roles().org_members(space.organization_id).await?;
                let is_org_user = members
                    .iter()
                    .any(|a| a.user_id == user_id && a.role == OrgRole::User);
                if is_org_user {
                    Ok(())
                } else {
                    Err(ConstraintViolation::InvalidRelation {
                        message: format!(
                            "user {user_id} must be a member of organization {} before holding a space role",
                            space.organization_id
                        ),
                    }
                    .into())
                }
            }
            ProposedChange::RemoveOrganizationUser {
                organization_id,
                user_id,
            } => {
                let roles = self.store.roles().roles_for_user(user_id).await?;
                let holds_space_role = roles
                    .space_roles
                    .iter()
                    .any(|a| a.organization_id == organization_id);
                if holds_space_role {
                    return Err(ConstraintViolation::AssociationNotEmpty {
                        entity: "user".into(),
                        id: user_id,
                        association: "space roles".into(),
                    }
                    .into());
                }
                let managers = self
                    .store
                    .roles()
                    .org_role_holders(organization_id, OrgRole::Manager)
                    .await?;
                let remaining = managers.iter().filter(|m| **m != user_id).count();
                validation::check_manager_floor(organization_id, managers.len(), remaining)?;
                Ok(())
            }
            ProposedChange::CreateApp { space_id, name } => {
                validation::validate_name("app.name", name)?;
                let existing = self.store.apps().find_by_name(space_id, name).await?;
                ensure_unique("app", name, existing.map(|a| a.id), None)
            }
            ProposedChange::RenameApp { app, name } => {
                validation::validate_name("app.name", name)?;
                let existing = self.store.apps().find_by_name(app.space_id, name).await?;
                ensure_unique("app", name, existing.map(|a| a.id), Some(app.id))
            }
            ProposedChange::RunApp {
                organization,
                app_id,
                memory_mb,
                instances,
            } => self.check_app_memory(organization, app_id, memory_mb, instances).await,
            ProposedChange::CreateServiceInstance {
                organization,
                space_id,
                name,
            } => {
                validation::validate_name("service_instance.name", name)?;
                let existing = self
                    .store
                    .service_instances()
                    .find_by_name(space_id, name)
                    .await?;
                ensure_unique("service instance", name, existing.map(|s| s.id), None)?;
                if let Some(quota_id) = organization.quota_definition_id {
                    let quota = self.store.quotas().get_by_id(quota_id).await?;
                    let current = self
                        .store
                        .service_instances()
                        .count_by_organization(organization.id)
                        .await?;
                    validation::check_count_quota(
                        organization.id,
                        "services",
                        quota.total_services,
                        current,
                    )?;
                }
                Ok(())
            }
            ProposedChange::RenameServiceInstance { instance, name } => {
                validation::validate_name("service_instance.name", name)?;
                let existing = self
                    .store
                    .service_instances()
                    .find_by_name(instance.space_id, name)
                    .await?;
                ensure_unique(
                    "service instance",
                    name,
                    existing.map(|s| s.id),
                    Some(instance.id),
                )
            }
            ProposedChange::CreateServiceBinding { app, instance } => {
                validation::check_binding_spaces(app.space_id, instance.space_id)?;
                Ok(())
            }
            ProposedChange::CreateRoute {
                organization,
                domain,
                host,
                path,
            } => {
                validation::validate_route_host(host)?;
                validation::validate_route_path(path)?;
                let existing = self.store.routes().find(domain.id, host, path).await?;
                if existing.is_some() {
                    return Err(duplicate("route", &format!("{host}.{}{path}", domain.name)));
                }
                validation::check_domain_access(domain, organization.id)?;
                if let Some(quota_id) = organization.quota_definition_id {
                    let quota = self.store.quotas().get_by_id(quota_id).await?;
                    let current = self.store.routes().count_by_organization(organization.id).await?;
                    validation::check_count_quota(
                        organization.id,
                        "routes",
                        quota.total_routes,
                        current,
                    )?;
                }
                Ok(())
            }
            ProposedChange::CreateDomain { name } => {
                validation::validate_domain_name(name)?;
                let existing = self.store.domains().find_by_name(name).await?;
                ensure_unique("domain", name, existing.map(|d| d.id), None)
            }
            ProposedChange::AddDomain {
                domain,
                organization_id,
            } => {
                validation::check_domain_access(domain, organization_id)?;
                Ok(())
            }
            ProposedChange::CreateSecurityGroup { name, rules } => {
                validation::validate_name("security_group.name", name)?;
                validation::validate_security_group_rules(rules)?;
                let existing = self.store.security_groups().find_by_name(name).await?;
                ensure_unique("security group", name, existing.map(|g| g.id), None)
            }
            ProposedChange::UpdateSecurityGroup {
                security_group_id,
                name,
                rules,
            } => {
                if let Some(name) = name {
                    validation::validate_name("security_group.name", name)?;
                }
                if let Some(rules) = rules {
                    validation::validate_security_group_rules(rules)?;
                }
                if let Some(name) = name {
                    let existing = self.store.security_groups().find_by_name(name).await?;
                    ensure_unique(
                        "security group",
                        name,
                        existing.map(|g| g.id),
                        Some(security_group_id),
                    )?;
                }
                Ok(())
            }
            ProposedChange::CreateQuota { name } => {
                validation::validate_name("quota_definition.name", name)?;
                let existing = self.store.quotas().find_by_name(name).await?;
                ensure_unique("quota definition", name, existing.map(|q| q.id), None)
            }
            ProposedChange::RenameQuota {
                quota_definition_id,
                name,
            } => {
                validation::validate_name("quota_definition.name", name)?;
                let existing = self.store.quotas().find_by_name(name).await?;
                ensure_unique(
                    "quota definition",
                    name,
                    existing.map(|q| q.id),
                    Some(quota_definition_id),
                )
            }
        }
    }

    async fn check_app_memory(
        &self,
        organization: &Organization,
        app_id: Option<Uuid>,
        memory_mb: u64,
        instances: u32,
    ) -> NimbusResult<()> {
        let Some(quota_id) = organization.quota_definition_id else {
            return Ok(());
        };
        let quota = self.store.quotas().get_by_id(quota_id).await?;
        let started = self.store.apps().started_memory_mb(organization.id).await?;

        // The app's own current footprint is replaced, not added to.
        let own = match app_id {
            Some(id) => {
                let app = self.store.apps().get_by_id(id).await?;
                if app.is_started() { app.total_memory_mb() } else { 0 }
            }
            None => 0,
        };

        validation::check_memory_quota(
            organization.id,
            quota.memory_limit_mb,
            quota.instance_memory_limit_mb,
            started.saturating_sub(own),
            memory_mb,
            instances,
        )?;
        Ok(())
    }
}
