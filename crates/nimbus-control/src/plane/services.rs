//! Service instances, their credentials and their bindings to apps.

use nimbus_authz::policy::{Child, Node, Operation, Permissions};
use nimbus_core::error::{ConstraintViolation, NimbusResult, ValidationError};
use nimbus_core::models::deletion::DeletedSet;
use nimbus_core::models::organization::Organization;
use nimbus_core::models::service_instance::{
    CreateServiceBinding, CreateServiceInstance, NewServiceInstance, ServiceBinding,
    ServiceInstance, ServiceInstanceChanges, ServiceInstanceKind, UpdateServiceInstance,
};
use nimbus_core::models::usage_event::UsageState;
use nimbus_core::repository::{
    AppRepository, PaginatedResult, Pagination, ResourceStore, ServiceBindingRepository,
    ServiceInstanceRepository, ServicePlanVisibilityRepository,
};
use serde_json::Value;
use uuid::Uuid;

use super::{ControlPlane, space_node};
use crate::constraints::ProposedChange;
use crate::usage::ServiceUsage;

impl<S: ResourceStore> ControlPlane<S> {
    fn seal_credentials(&self, credentials: Option<&Value>) -> NimbusResult<Option<String>> {
        match credentials {
            None => Ok(None),
            Some(value @ Value::Object(_)) => Ok(Some(self.cipher.seal(value)?)),
            Some(_) => Err(ValidationError::InvalidFormat {
                field: "service_instance.credentials".into(),
                message: "must be a JSON object".into(),
            }
            .into()),
        }
    }

    /// Managed instances need their plan to be visible to the organization.
    async fn check_plan_visible(
        &self,
        perms: &Permissions,
        organization: &Organization,
        kind: &ServiceInstanceKind,
    ) -> NimbusResult<()> {
        let ServiceInstanceKind::Managed { service_plan_id } = kind else {
            return Ok(());
        };
        if perms.is_admin() {
            return Ok(());
        }
        let visible = self
            .store
            .plan_visibilities()
            .list_by_organizations(&[organization.id])
            .await?
            .iter()
            .any(|v| v.service_plan_id == *service_plan_id);
        if visible {
            Ok(())
        } else {
            Err(ConstraintViolation::InvalidRelation {
                message: format!(
                    "service plan {service_plan_id} is not available to organization {}",
                    organization.id
                ),
            }
            .into())
        }
    }

    pub async fn create_service_instance(
        &self,
        perms: &Permissions,
        input: CreateServiceInstance,
    ) -> NimbusResult<ServiceInstance> {
        let (space, organization) = self.visible_space(perms, input.space_id).await?;
        perms
            .authorize(Operation::Create(Child::ServiceInstance), &space_node(&space))
            .into_result("space", space.id)?;
        Self::ensure_writable(perms, &organization)?;

        self.validate(ProposedChange::CreateServiceInstance {
            organization: &organization,
            space_id: space.id,
            name: &input.name,
        })
        .await?;
        self.check_plan_visible(perms, &organization, &input.kind)
            .await?;

        let encrypted_credentials = self.seal_credentials(input.credentials.as_ref())?;
        let new_instance = NewServiceInstance {
            id: Uuid::new_v4(),
            space_id: space.id,
            name: input.name,
            kind: input.kind,
            encrypted_credentials,
        };
        let events = self
            .emitter
            .service_events(&organization, &new_instance, UsageState::Created);
        self.store
            .service_instances()
            .create(new_instance, events)
            .await
    }

    pub async fn get_service_instance(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<ServiceInstance> {
        let instance = self.store.service_instances().get_by_id(id).await?;
        self.authorize_in_space(perms, Operation::Read, "service instance", id, instance.space_id)
            .await?;
        Ok(instance)
    }

    pub async fn list_service_instances(
        &self,
        perms: &Permissions,
        space_id: Option<Uuid>,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<ServiceInstance>> {
        let scope = self.listing_scope(perms, space_id).await?;
        let instances = self.store.service_instances().list_by_spaces(&scope).await?;
        Ok(PaginatedResult::from_vec(instances, pagination))
    }

    pub async fn update_service_instance(
        &self,
        perms: &Permissions,
        id: Uuid,
        input: UpdateServiceInstance,
    ) -> NimbusResult<ServiceInstance> {
        let instance = self.store.service_instances().get_by_id(id).await?;
        let (_, organization) = self
            .authorize_in_space(perms, Operation::Update, "service instance", id, instance.space_id)
            .await?;

        if let Some(name) = &input.name {
            self.validate(ProposedChange::RenameServiceInstance {
                instance: &instance,
                name,
            })
            .await?;
        }
        let changes = ServiceInstanceChanges {
            encrypted_credentials: self.seal_credentials(input.credentials.as_ref())?,
            name: input.name,
        };

        let after = ServiceUsage {
            name: changes.name.as_deref().unwrap_or(&instance.name),
            ..ServiceUsage::from(&instance)
        };
        let events = self
            .emitter
            .service_events(&organization, after, UsageState::Updated);
        self.store
            .service_instances()
            .update(id, changes, events)
            .await
    }

    /// Decrypted credentials. Space developers and admins only.
    pub async fn service_instance_credentials(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<Value> {
        let instance = self.store.service_instances().get_by_id(id).await?;
        let (space, _) = self.visible_space(perms, instance.space_id).await?;
        let node = Node::SpaceResource {
            space_id: space.id,
            organization_id: space.organization_id,
        };
        perms
            .authorize(Operation::ReadCredentials, &node)
            .into_result("service instance", id)?;
        match &instance.encrypted_credentials {
            Some(sealed) => self.cipher.open(sealed),
            None => Ok(Value::Object(Default::default())),
        }
    }

    /// Deletes a service instance; with `recursive`, its bindings go in the
    /// same transaction.
    pub async fn delete_service_instance(
        &self,
        perms: &Permissions,
        id: Uuid,
        recursive: bool,
    ) -> NimbusResult<DeletedSet> {
        let instance = self.store.service_instances().get_by_id(id).await?;
        let (_, organization) = self
            .authorize_in_space(perms, Operation::Delete, "service instance", id, instance.space_id)
            .await?;
        let plan = self
            .planner()
            .plan_service_instance(&organization, &instance, recursive)
            .await?;
        self.execute_plan(&plan).await
    }

    /// Binds an app to a service instance in the same space.
    pub async fn create_service_binding(
        &self,
        perms: &Permissions,
        input: CreateServiceBinding,
    ) -> NimbusResult<ServiceBinding> {
        let app = self.store.apps().get_by_id(input.app_id).await?;
        let (space, organization) = self.visible_space(perms, app.space_id).await?;
        perms
            .authorize(Operation::Create(Child::ServiceBinding), &space_node(&space))
            .into_result("app", app.id)?;
        Self::ensure_writable(perms, &organization)?;

        let instance = self
            .store
            .service_instances()
            .get_by_id(input.service_instance_id)
            .await?;
        self.authorize_in_space(
            perms,
            Operation::Read,
            "service instance",
            instance.id,
            instance.space_id,
        )
        .await?;

        self.validate(ProposedChange::CreateServiceBinding {
            app: &app,
            instance: &instance,
        })
        .await?;
        self.store
            .service_bindings()
            .create(app.id, instance.id, space.id)
            .await
    }

    pub async fn get_service_binding(
        &self,
        perms: &Permissions,
        id: Uuid,
    ) -> NimbusResult<ServiceBinding> {
        let binding = self.store.service_bindings().get_by_id(id).await?;
        self.authorize_in_space(perms, Operation::Read, "service binding", id, binding.space_id)
            .await?;
        Ok(binding)
    }

    pub async fn list_service_bindings(
        &self,
        perms: &Permissions,
        space_id: Option<Uuid>,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<ServiceBinding>> {
        let scope = self.listing_scope(perms, space_id).await?;
        let bindings = self.store.service_bindings().list_by_spaces(&scope).await?;
        Ok(PaginatedResult::from_vec(bindings, pagination))
    }

    pub async fn delete_service_binding(&self, perms: &Permissions, id: Uuid) -> NimbusResult<()> {
        let binding = self.store.service_bindings().get_by_id(id).await?;
        self.authorize_in_space(perms, Operation::Delete, "service binding", id, binding.space_id)
            .await?;
        self.store.service_bindings().delete(id).await
    }
}
