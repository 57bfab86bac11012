//! Integration tests for the space-scoped and platform-level resource
//! repositories using in-memory SurrealDB.

use nimbus_core::error::{NimbusError, ValidationError};
use nimbus_core::models::app::{AppState, NewApp, UpdateApp};
use nimbus_core::models::domain::{CreateDomain, DomainKind};
use nimbus_core::models::organization::CreateOrganization;
use nimbus_core::models::quota::{CreateQuotaDefinition, UpdateQuotaDefinition};
use nimbus_core::models::route::CreateRoute;
use nimbus_core::models::security_group::{
    CreateSecurityGroup, GloballyEnabled, Lifecycle, Protocol, SecurityGroupRule,
};
use nimbus_core::models::service_instance::{
    NewServiceInstance, ServiceInstanceChanges, ServiceInstanceKind,
};
use nimbus_core::models::service_plan_visibility::CreateServicePlanVisibility;
use nimbus_core::models::space::{CreateSpace, Space};
use nimbus_core::models::usage_event::{NewUsageEvent, UsageEventKind, UsageState};
use nimbus_core::repository::{
    AppRepository, DomainRepository, OrganizationRepository, Pagination,
    QuotaDefinitionRepository, ResourceStore, RouteRepository, SecurityGroupRepository,
    ServiceBindingRepository, ServiceInstanceRepository, ServicePlanVisibilityRepository,
    SpaceRepository, UsageEventRepository, UsageEventSink,
};
use nimbus_db::SurrealStore;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> SurrealStore<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    nimbus_db::run_migrations(&db).await.unwrap();
    SurrealStore::new(db)
}

/// Creates an organization with one space.
async fn space(store: &SurrealStore<Db>, org: &str) -> Space {
    let org = store
        .organizations()
        .create(
            CreateOrganization {
                name: org.into(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    store
        .spaces()
        .create(CreateSpace {
            organization_id: org.id,
            name: "dev".into(),
        })
        .await
        .unwrap()
}

fn new_app(space_id: Uuid, name: &str, memory_mb: u64, instances: u32) -> NewApp {
    NewApp {
        id: Uuid::new_v4(),
        space_id,
        name: name.into(),
        memory_mb,
        instances,
    }
}

// -----------------------------------------------------------------------
// Apps
// -----------------------------------------------------------------------

#[tokio::test]
async fn started_memory_counts_only_started_apps() {
    let store = setup().await;
    let space = space(&store, "acme").await;

    let a = store
        .apps()
        .create(new_app(space.id, "a", 200, 2), vec![])
        .await
        .unwrap();
    let b = store
        .apps()
        .create(new_app(space.id, "b", 50, 1), vec![])
        .await
        .unwrap();
    store
        .apps()
        .create(new_app(space.id, "idle", 1024, 4), vec![])
        .await
        .unwrap();
    assert_eq!(a.state, AppState::Stopped);

    for id in [a.id, b.id] {
        store
            .apps()
            .update(
                id,
                UpdateApp {
                    state: Some(AppState::Started),
                    ..Default::default()
                },
                vec![],
            )
            .await
            .unwrap();
    }

    let used = store
        .apps()
        .started_memory_mb(space.organization_id)
        .await
        .unwrap();
    assert_eq!(used, 450);
}

#[tokio::test]
async fn app_names_are_unique_per_space() {
    let store = setup().await;
    let space = space(&store, "acme").await;
    store
        .apps()
        .create(new_app(space.id, "web", 256, 1), vec![])
        .await
        .unwrap();

    let err = store
        .apps()
        .create(new_app(space.id, "web", 256, 1), vec![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Validation(ValidationError::DuplicateName { .. })
    ));
    assert!(
        store
            .apps()
            .find_by_name(space.id, "web")
            .await
            .unwrap()
            .is_some()
    );
}

fn app_event(app: &NewApp, organization_id: Uuid, state: UsageState) -> NewUsageEvent {
    NewUsageEvent {
        kind: UsageEventKind::App,
        state,
        resource_id: app.id,
        resource_name: app.name.clone(),
        organization_id,
        space_id: Some(app.space_id),
        memory_mb: Some(app.memory_mb),
        instances: Some(app.instances),
    }
}

#[tokio::test]
async fn app_writes_commit_with_their_usage_events() {
    let store = setup().await;
    let space = space(&store, "acme").await;
    let input = new_app(space.id, "web", 256, 2);
    let created = app_event(&input, space.organization_id, UsageState::Created);
    let started = app_event(&input, space.organization_id, UsageState::Started);

    let app = store.apps().create(input, vec![created]).await.unwrap();
    store
        .apps()
        .update(
            app.id,
            UpdateApp {
                state: Some(AppState::Started),
                ..Default::default()
            },
            vec![started],
        )
        .await
        .unwrap();

    let states: Vec<_> = store
        .usage_events()
        .list_for_resource(app.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.state)
        .collect();
    assert_eq!(states, vec![UsageState::Created, UsageState::Started]);
}

#[tokio::test]
async fn failed_event_insert_rolls_back_the_write() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    nimbus_db::run_migrations(&db).await.unwrap();
    let store = SurrealStore::new(db.clone());
    let space = space(&store, "acme").await;

    db.query("DEFINE FIELD OVERWRITE resource_name ON TABLE usage_event TYPE string ASSERT false")
        .await
        .unwrap()
        .check()
        .unwrap();

    let input = new_app(space.id, "web", 256, 1);
    let created = app_event(&input, space.organization_id, UsageState::Created);
    assert!(
        store
            .apps()
            .create(input.clone(), vec![created.clone()])
            .await
            .is_err()
    );
    assert!(
        store
            .apps()
            .find_by_name(space.id, "web")
            .await
            .unwrap()
            .is_none()
    );

    db.query("DEFINE FIELD OVERWRITE resource_name ON TABLE usage_event TYPE string")
        .await
        .unwrap()
        .check()
        .unwrap();

    // Nothing was left behind, so the retry is not a duplicate.
    let app = store.apps().create(input, vec![created]).await.unwrap();
    assert_eq!(
        store
            .usage_events()
            .list_for_resource(app.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

// -----------------------------------------------------------------------
// Service instances & bindings
// -----------------------------------------------------------------------

#[tokio::test]
async fn service_instance_kinds_round_trip_through_storage() {
    let store = setup().await;
    let space = space(&store, "acme").await;
    let plan = Uuid::new_v4();

    let managed = store
        .service_instances()
        .create(
            NewServiceInstance {
                id: Uuid::new_v4(),
                space_id: space.id,
                name: "db".into(),
                kind: ServiceInstanceKind::Managed {
                    service_plan_id: plan,
                },
                encrypted_credentials: Some("sealed".into()),
            },
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(
        managed.kind,
        ServiceInstanceKind::Managed {
            service_plan_id: plan
        }
    );
    assert_eq!(managed.encrypted_credentials.as_deref(), Some("sealed"));

    let ups = store
        .service_instances()
        .create(
            NewServiceInstance {
                id: Uuid::new_v4(),
                space_id: space.id,
                name: "logs".into(),
                kind: ServiceInstanceKind::UserProvided {
                    syslog_drain_url: Some("syslog://logs.example.com".into()),
                },
                encrypted_credentials: None,
            },
            vec![],
        )
        .await
        .unwrap();

    let renamed = store
        .service_instances()
        .update(
            ups.id,
            ServiceInstanceChanges {
                name: Some("drain".into()),
                ..Default::default()
            },
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "drain");
    assert_eq!(renamed.kind, ups.kind);

    assert_eq!(
        store
            .service_instances()
            .count_by_organization(space.organization_id)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn binding_the_same_pair_twice_is_a_duplicate() {
    let store = setup().await;
    let space = space(&store, "acme").await;
    let app = store
        .apps()
        .create(new_app(space.id, "web", 256, 1), vec![])
        .await
        .unwrap();
    let si = store
        .service_instances()
        .create(
            NewServiceInstance {
                id: Uuid::new_v4(),
                space_id: space.id,
                name: "db".into(),
                kind: ServiceInstanceKind::UserProvided {
                    syslog_drain_url: None,
                },
                encrypted_credentials: None,
            },
            vec![],
        )
        .await
        .unwrap();

    let binding = store
        .service_bindings()
        .create(app.id, si.id, space.id)
        .await
        .unwrap();
    let err = store
        .service_bindings()
        .create(app.id, si.id, space.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Validation(ValidationError::DuplicateName { .. })
    ));

    assert_eq!(
        store.service_bindings().list_by_app(app.id).await.unwrap(),
        vec![binding.clone()]
    );
    store.service_bindings().delete(binding.id).await.unwrap();
    assert!(
        store
            .service_bindings()
            .list_by_service_instance(si.id)
            .await
            .unwrap()
            .is_empty()
    );
}

// -----------------------------------------------------------------------
// Domains & routes
// -----------------------------------------------------------------------

#[tokio::test]
async fn usable_domains_are_shared_plus_owned() {
    let store = setup().await;
    let a = space(&store, "a").await.organization_id;
    let b = space(&store, "b").await.organization_id;

    let shared = store
        .domains()
        .create(CreateDomain {
            name: "apps.example.com".into(),
            owning_organization_id: None,
        })
        .await
        .unwrap();
    assert_eq!(shared.kind, DomainKind::Shared);
    let private_a = store
        .domains()
        .create(CreateDomain {
            name: "a.example.com".into(),
            owning_organization_id: Some(a),
        })
        .await
        .unwrap();
    store
        .domains()
        .create(CreateDomain {
            name: "b.example.com".into(),
            owning_organization_id: Some(b),
        })
        .await
        .unwrap();

    let usable: Vec<Uuid> = store
        .domains()
        .list_usable_by(&[a])
        .await
        .unwrap()
        .iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(usable, vec![shared.id, private_a.id]);
    assert_eq!(store.domains().list_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn routes_are_unique_per_domain_host_and_path() {
    let store = setup().await;
    let space = space(&store, "acme").await;
    let domain = store
        .domains()
        .create(CreateDomain {
            name: "apps.example.com".into(),
            owning_organization_id: None,
        })
        .await
        .unwrap();

    let route = |path: Option<&str>| CreateRoute {
        space_id: space.id,
        domain_id: domain.id,
        host: "www".into(),
        path: path.map(Into::into),
    };

    let root = store.routes().create(route(None)).await.unwrap();
    assert_eq!(root.path, "");
    store.routes().create(route(Some("/api"))).await.unwrap();
    let err = store.routes().create(route(None)).await.unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Validation(ValidationError::DuplicateName { .. })
    ));

    assert_eq!(store.routes().count_by_domain(domain.id).await.unwrap(), 2);
    assert_eq!(
        store
            .routes()
            .count_by_organization(space.organization_id)
            .await
            .unwrap(),
        2
    );
    let found = store
        .routes()
        .find(domain.id, "www", "/api")
        .await
        .unwrap();
    assert!(found.is_some());
}

// -----------------------------------------------------------------------
// Security groups
// -----------------------------------------------------------------------

#[tokio::test]
async fn security_group_bindings_are_tracked_per_lifecycle() {
    let store = setup().await;
    let space = space(&store, "acme").await;

    let group = store
        .security_groups()
        .create(CreateSecurityGroup {
            name: "dns".into(),
            rules: vec![SecurityGroupRule {
                protocol: Protocol::Udp,
                destination: "0.0.0.0/0".into(),
                ports: Some("53".into()),
                icmp_type: None,
                icmp_code: None,
                description: Some("resolver".into()),
            }],
            globally_enabled: GloballyEnabled::default(),
        })
        .await
        .unwrap();
    assert_eq!(group.rules.len(), 1);
    assert_eq!(group.rules[0].ports.as_deref(), Some("53"));

    let sgs = store.security_groups();
    sgs.bind_space(group.id, space.id, Lifecycle::Running)
        .await
        .unwrap();
    sgs.bind_space(group.id, space.id, Lifecycle::Running)
        .await
        .unwrap();

    let rel = sgs.relationships(group.id).await.unwrap();
    assert!(rel.staging_spaces.data.is_empty());
    assert_eq!(rel.running_spaces.guids().collect::<Vec<_>>(), vec![space.id]);
    assert_eq!(
        sgs.ids_bound_to_spaces(&[space.id]).await.unwrap(),
        vec![group.id]
    );

    sgs.unbind_space(group.id, space.id, Lifecycle::Running)
        .await
        .unwrap();
    assert!(
        sgs.ids_bound_to_spaces(&[space.id])
            .await
            .unwrap()
            .is_empty()
    );

    sgs.bind_space(group.id, space.id, Lifecycle::Staging)
        .await
        .unwrap();
    sgs.delete(group.id).await.unwrap();
    assert!(sgs.find_by_name("dns").await.unwrap().is_none());
    assert!(
        sgs.ids_bound_to_spaces(&[space.id])
            .await
            .unwrap()
            .is_empty()
    );
}

// -----------------------------------------------------------------------
// Quotas & plan visibilities
// -----------------------------------------------------------------------

#[tokio::test]
async fn quota_definitions_update_optional_limits() {
    let store = setup().await;
    let quota = store
        .quotas()
        .create(CreateQuotaDefinition {
            name: "small".into(),
            memory_limit_mb: 1024,
            instance_memory_limit_mb: None,
            total_services: Some(5),
            total_routes: None,
        })
        .await
        .unwrap();
    assert_eq!(quota.total_services, Some(5));
    assert_eq!(quota.instance_memory_limit_mb, None);

    let updated = store
        .quotas()
        .update(
            quota.id,
            UpdateQuotaDefinition {
                memory_limit_mb: Some(2048),
                total_routes: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.memory_limit_mb, 2048);
    assert_eq!(updated.total_routes, Some(10));
    assert_eq!(updated.total_services, Some(5));
}

#[tokio::test]
async fn plan_visibilities_are_unique_per_pair() {
    let store = setup().await;
    let org = space(&store, "acme").await.organization_id;
    let input = || CreateServicePlanVisibility {
        service_plan_id: Uuid::nil(),
        organization_id: org,
    };

    store.plan_visibilities().create(input()).await.unwrap();
    assert!(store.plan_visibilities().create(input()).await.is_err());
    assert_eq!(
        store
            .plan_visibilities()
            .list_by_organizations(&[org])
            .await
            .unwrap()
            .len(),
        1
    );
}

// -----------------------------------------------------------------------
// Usage events
// -----------------------------------------------------------------------

#[tokio::test]
async fn usage_events_are_listed_per_resource() {
    let store = setup().await;
    let resource_id = Uuid::new_v4();
    let organization_id = Uuid::new_v4();

    for state in [UsageState::Started, UsageState::Stopped] {
        store
            .usage_events()
            .record(NewUsageEvent {
                kind: UsageEventKind::App,
                state,
                resource_id,
                resource_name: "web".into(),
                organization_id,
                space_id: None,
                memory_mb: Some(256),
                instances: Some(2),
            })
            .await
            .unwrap();
    }

    let events = store
        .usage_events()
        .list_for_resource(resource_id)
        .await
        .unwrap();
    let states: Vec<_> = events.iter().map(|e| e.state).collect();
    assert_eq!(states, vec![UsageState::Started, UsageState::Stopped]);
    assert_eq!(events[0].space_id, None);
    assert_eq!(events[0].instances, Some(2));

    let page = store
        .usage_events()
        .list(Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}
