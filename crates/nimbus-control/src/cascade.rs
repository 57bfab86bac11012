//! Deletion planning.
//!
//! The planner walks the subtree under a root with an explicit
//! breadth-first work list and produces a [`DeletionPlan`]: the rows to
//! remove, deepest first, the usage events to record, and the guards the
//! executor uses to detect that the subtree changed before it committed.

use std::collections::{BTreeSet, VecDeque};

use nimbus_core::error::{ConstraintViolation, NimbusResult};
use nimbus_core::models::app::App;
use nimbus_core::models::deletion::{DeletionPlan, DeletionStep, PlanGuard, ResourceKind};
use nimbus_core::models::domain::Domain;
use nimbus_core::models::organization::Organization;
use nimbus_core::models::route::Route;
use nimbus_core::models::service_instance::{ServiceBinding, ServiceInstance};
use nimbus_core::models::service_plan_visibility::ServicePlanVisibility;
use nimbus_core::models::space::Space;
use nimbus_core::models::usage_event::{NewUsageEvent, UsageState};
use nimbus_core::repository::{
    AppRepository, DomainRepository, ResourceStore, RouteRepository,
    ServiceBindingRepository, ServiceInstanceRepository, ServicePlanVisibilityRepository,
    SpaceRepository,
};
use uuid::Uuid;

use crate::usage::UsageEventEmitter;

enum Pending {
    Organization(Uuid),
    Space(Space),
    App(App),
    ServiceInstance(ServiceInstance),
}

/// Everything found under a root, in discovery order.
#[derive(Default)]
struct Subtree {
    spaces: Vec<Space>,
    apps: Vec<App>,
    service_instances: Vec<ServiceInstance>,
    routes: Vec<Route>,
    bindings: Vec<ServiceBinding>,
    domains: Vec<Domain>,
    visibilities: Vec<ServicePlanVisibility>,
    seen_bindings: BTreeSet<Uuid>,
}

impl Subtree {
    fn add_bindings(&mut self, bindings: Vec<ServiceBinding>) {
        for binding in bindings {
            if self.seen_bindings.insert(binding.id) {
                self.bindings.push(binding);
            }
        }
    }

    /// The first non-empty child association, as named in errors.
    fn first_association(&self, root: ResourceKind) -> Option<&'static str> {
        let candidates = match root {
            ResourceKind::Organization => vec![
                ("spaces", !self.spaces.is_empty()),
                ("private domains", !self.domains.is_empty()),
                ("service plan visibilities", !self.visibilities.is_empty()),
            ],
            ResourceKind::Space => vec![
                ("apps", !self.apps.is_empty()),
                ("service instances", !self.service_instances.is_empty()),
                ("routes", !self.routes.is_empty()),
            ],
            ResourceKind::ServiceInstance => vec![("service bindings", !self.bindings.is_empty())],
            _ => Vec::new(),
        };
        candidates
            .into_iter()
            .find(|(_, present)| *present)
            .map(|(name, _)| name)
    }
}

fn ids<T>(items: &[T], id: impl Fn(&T) -> Uuid) -> Vec<Uuid> {
    items.iter().map(id).collect()
}

/// Builds deletion plans from the current state of the resource graph.
pub struct DeletionPlanner<'a, S: ResourceStore> {
    store: &'a S,
    emitter: UsageEventEmitter,
}

impl<'a, S: ResourceStore> DeletionPlanner<'a, S> {
    pub fn new(store: &'a S, emitter: UsageEventEmitter) -> Self {
        Self { store, emitter }
    }

    pub async fn plan_organization(
        &self,
        organization: &Organization,
        recursive: bool,
    ) -> NimbusResult<DeletionPlan> {
        self.plan(
            organization,
            ResourceKind::Organization,
            organization.id,
            Pending::Organization(organization.id),
            recursive,
        )
        .await
    }

    pub async fn plan_space(
        &self,
        organization: &Organization,
        space: &Space,
        recursive: bool,
    ) -> NimbusResult<DeletionPlan> {
        self.plan(
            organization,
            ResourceKind::Space,
            space.id,
            Pending::Space(space.clone()),
            recursive,
        )
        .await
    }

    /// Apps always take their bindings with them.
    pub async fn plan_app(&self, organization: &Organization, app: &App) -> NimbusResult<DeletionPlan> {
        self.plan(
            organization,
            ResourceKind::App,
            app.id,
            Pending::App(app.clone()),
            true,
        )
        .await
    }

    pub async fn plan_service_instance(
        &self,
        organization: &Organization,
        instance: &ServiceInstance,
        recursive: bool,
    ) -> NimbusResult<DeletionPlan> {
        self.plan(
            organization,
            ResourceKind::ServiceInstance,
            instance.id,
            Pending::ServiceInstance(instance.clone()),
            recursive,
        )
        .await
    }

    async fn plan(
        &self,
        organization: &Organization,
        root_kind: ResourceKind,
        root_id: Uuid,
        root: Pending,
        recursive: bool,
    ) -> NimbusResult<DeletionPlan> {
        let tree = self.walk(root).await?;

        if !recursive {
            if let Some(association) = tree.first_association(root_kind) {
                return Err(ConstraintViolation::AssociationNotEmpty {
                    entity: root_kind.table().into(),
                    id: root_id,
                    association: association.into(),
                }
                .into());
            }
        }

        Ok(DeletionPlan {
            root_kind,
            root_id,
            organization_id: organization.id,
            steps: steps(&tree, root_kind, root_id),
            usage_events: self.events(organization, &tree),
            guards: guards(&tree, root_kind, root_id),
            started_app_ids: tree
                .apps
                .iter()
                .filter(|a| a.is_started())
                .map(|a| a.id)
                .collect(),
        })
    }

    async fn walk(&self, root: Pending) -> NimbusResult<Subtree> {
        let mut tree = Subtree::default();
        let mut work = VecDeque::from([root]);

        while let Some(next) = work.pop_front() {
            match next {
                Pending::Organization(id) => {
                    for space in self.store.spaces().list_by_organization(id).await? {
                        work.push_back(Pending::Space(space));
                    }
                    tree.domains = self
                        .store
                        .domains()
                        .list_usable_by(&[id])
                        .await?
                        .into_iter()
                        .filter(|d| d.owning_organization_id() == Some(id))
                        .collect();
                    tree.visibilities = self
                        .store
                        .plan_visibilities()
                        .list_by_organizations(&[id])
                        .await?;
                }
                Pending::Space(space) => {
                    let scope = [space.id];
                    for app in self.store.apps().list_by_spaces(&scope).await? {
                        work.push_back(Pending::App(app));
                    }
                    for instance in self.store.service_instances().list_by_spaces(&scope).await? {
                        work.push_back(Pending::ServiceInstance(instance));
                    }
                    tree.routes
                        .extend(self.store.routes().list_by_spaces(&scope).await?);
                    tree.spaces.push(space);
                }
                Pending::App(app) => {
                    tree.add_bindings(self.store.service_bindings().list_by_app(app.id).await?);
                    tree.apps.push(app);
                }
                Pending::ServiceInstance(instance) => {
                    tree.add_bindings(
                        self.store
                            .service_bindings()
                            .list_by_service_instance(instance.id)
                            .await?,
                    );
                    tree.service_instances.push(instance);
                }
            }
        }
        Ok(tree)
    }

    /// Started apps stop, then every app and service instance is deleted.
    fn events(&self, organization: &Organization, tree: &Subtree) -> Vec<NewUsageEvent> {
        let mut events = Vec::new();
        for app in &tree.apps {
            if app.is_started() {
                events.extend(self.emitter.app_events(organization, app, UsageState::Stopped));
            }
            events.extend(self.emitter.app_events(organization, app, UsageState::Deleted));
        }
        for instance in &tree.service_instances {
            events.extend(
                self.emitter
                    .service_events(organization, instance, UsageState::Deleted),
            );
        }
        events
    }
}

fn steps(tree: &Subtree, root_kind: ResourceKind, root_id: Uuid) -> Vec<DeletionStep> {
    let space_ids = ids(&tree.spaces, |s| s.id);
    let mut steps = vec![
        (ResourceKind::ServiceBinding, ids(&tree.bindings, |b| b.id)),
        (ResourceKind::Route, ids(&tree.routes, |r| r.id)),
        (ResourceKind::App, ids(&tree.apps, |a| a.id)),
        (
            ResourceKind::ServiceInstance,
            ids(&tree.service_instances, |s| s.id),
        ),
        (ResourceKind::SpaceRoles, space_ids.clone()),
        (ResourceKind::StagingSecurityGroups, space_ids.clone()),
        (ResourceKind::RunningSecurityGroups, space_ids.clone()),
        (ResourceKind::Space, space_ids),
        (ResourceKind::Domain, ids(&tree.domains, |d| d.id)),
        (
            ResourceKind::ServicePlanVisibility,
            ids(&tree.visibilities, |v| v.id),
        ),
    ];
    if root_kind == ResourceKind::Organization {
        steps.push((ResourceKind::OrgRoles, vec![root_id]));
        steps.push((ResourceKind::Organization, vec![root_id]));
    }
    steps
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(kind, ids)| DeletionStep { kind, ids })
        .collect()
}

fn guards(tree: &Subtree, root_kind: ResourceKind, root_id: Uuid) -> Vec<PlanGuard> {
    let guard = |kind, parent_column, parent_ids: Vec<Uuid>, expected| PlanGuard {
        kind,
        parent_column,
        parent_ids,
        expected,
    };
    let space_ids = ids(&tree.spaces, |s| s.id);
    let mut guards = Vec::new();

    match root_kind {
        ResourceKind::Organization => {
            guards.push(guard(
                ResourceKind::Space,
                "organization_id",
                vec![root_id],
                tree.spaces.len(),
            ));
            guards.push(guard(
                ResourceKind::Domain,
                "owning_organization_id",
                vec![root_id],
                tree.domains.len(),
            ));
            guards.push(guard(
                ResourceKind::ServicePlanVisibility,
                "organization_id",
                vec![root_id],
                tree.visibilities.len(),
            ));
        }
        ResourceKind::App => {
            guards.push(guard(
                ResourceKind::ServiceBinding,
                "app_id",
                vec![root_id],
                tree.bindings.len(),
            ));
        }
        ResourceKind::ServiceInstance => {
            guards.push(guard(
                ResourceKind::ServiceBinding,
                "service_instance_id",
                vec![root_id],
                tree.bindings.len(),
            ));
        }
        _ => {}
    }

    if !space_ids.is_empty() {
        guards.push(guard(
            ResourceKind::App,
            "space_id",
            space_ids.clone(),
            tree.apps.len(),
        ));
        guards.push(guard(
            ResourceKind::ServiceInstance,
            "space_id",
            space_ids.clone(),
            tree.service_instances.len(),
        ));
        guards.push(guard(
            ResourceKind::Route,
            "space_id",
            space_ids.clone(),
            tree.routes.len(),
        ));
        guards.push(guard(
            ResourceKind::ServiceBinding,
            "space_id",
            space_ids,
            tree.bindings.len(),
        ));
    }
    guards
}
