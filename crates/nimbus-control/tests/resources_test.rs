//! Control plane tests for space resources, domains, security groups and
//! cascading deletes, over in-memory SurrealDB.

use nimbus_authz::Permissions;
use nimbus_control::{ControlConfig, ControlPlane};
use nimbus_core::error::{ConstraintViolation, NimbusError};
use nimbus_core::models::app::{AppState, CreateApp};
use nimbus_core::models::deletion::ResourceKind;
use nimbus_core::models::domain::CreateDomain;
use nimbus_core::models::organization::CreateOrganization;
use nimbus_core::models::role::{OrgRole, SpaceRole};
use nimbus_core::models::route::CreateRoute;
use nimbus_core::models::security_group::{CreateSecurityGroup, GloballyEnabled, Lifecycle};
use nimbus_core::models::service_instance::{
    CreateServiceBinding, CreateServiceInstance, ServiceInstanceKind,
};
use nimbus_core::models::space::CreateSpace;
use nimbus_core::models::usage_event::{UsageEventKind, UsageState};
use nimbus_core::models::user::CreateUser;
use nimbus_core::repository::{
    AppRepository, Pagination, ResourceStore, RoleRepository, ServiceBindingRepository,
    UsageEventRepository,
};
use nimbus_db::SurrealStore;
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

type Plane = ControlPlane<SurrealStore<Db>>;

async fn memory_db() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    nimbus_db::run_migrations(&db).await.unwrap();
    db
}

fn config() -> ControlConfig {
    ControlConfig {
        credentials_key: [7u8; 32],
        ..Default::default()
    }
}

/// Helper: spin up in-memory DB, run migrations and wrap it in a plane.
async fn setup() -> Plane {
    ControlPlane::new(SurrealStore::new(memory_db().await), config())
}

async fn register(plane: &Plane, username: &str) -> Uuid {
    plane
        .register_user(
            &Permissions::system(),
            CreateUser {
                id: None,
                username: username.into(),
            },
        )
        .await
        .unwrap()
        .id
}

async fn perms_for(plane: &Plane, user_id: Uuid) -> Permissions {
    let roles = plane.store().roles().roles_for_user(user_id).await.unwrap();
    Permissions::new(user_id, [], roles)
}

async fn org(plane: &Plane, name: &str) -> Uuid {
    plane
        .create_organization(
            &Permissions::system(),
            CreateOrganization {
                name: name.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

async fn space(plane: &Plane, organization_id: Uuid, name: &str) -> Uuid {
    plane
        .create_space(
            &Permissions::system(),
            CreateSpace {
                organization_id,
                name: name.into(),
            },
        )
        .await
        .unwrap()
        .id
}

async fn app(plane: &Plane, space_id: Uuid, name: &str) -> Uuid {
    plane
        .create_app(
            &Permissions::system(),
            CreateApp {
                space_id,
                name: name.into(),
                memory_mb: Some(128),
                instances: Some(1),
            },
        )
        .await
        .unwrap()
        .id
}

fn user_provided(space_id: Uuid, name: &str) -> CreateServiceInstance {
    CreateServiceInstance {
        space_id,
        name: name.into(),
        kind: ServiceInstanceKind::UserProvided {
            syslog_drain_url: None,
        },
        credentials: None,
    }
}

async fn instance(plane: &Plane, space_id: Uuid, name: &str) -> Uuid {
    plane
        .create_service_instance(&Permissions::system(), user_provided(space_id, name))
        .await
        .unwrap()
        .id
}

/// A user holding `role` in `space_id`, and the org `user` role it needs.
async fn space_member(plane: &Plane, organization_id: Uuid, space_id: Uuid, role: SpaceRole) -> Uuid {
    let admin = Permissions::system();
    let user = register(plane, &format!("{}-{}", role.as_str(), Uuid::new_v4())).await;
    plane
        .add_organization_role(&admin, organization_id, user, OrgRole::User)
        .await
        .unwrap();
    plane
        .add_space_role(&admin, space_id, user, role)
        .await
        .unwrap();
    user
}

// -----------------------------------------------------------------------
// Service bindings
// -----------------------------------------------------------------------

#[tokio::test]
async fn binding_requires_app_and_instance_in_the_same_space() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let prod = space(&plane, acme, "prod").await;

    let web = app(&plane, dev, "web").await;
    let local_db = instance(&plane, dev, "db").await;
    let prod_db = instance(&plane, prod, "db").await;

    let binding = plane
        .create_service_binding(
            &admin,
            CreateServiceBinding {
                app_id: web,
                service_instance_id: local_db,
            },
        )
        .await
        .unwrap();
    assert_eq!(binding.space_id, dev);

    let err = plane
        .create_service_binding(
            &admin,
            CreateServiceBinding {
                app_id: web,
                service_instance_id: prod_db,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Constraint(ConstraintViolation::InvalidServiceBinding { .. })
    ));
}

#[tokio::test]
async fn instance_with_bindings_needs_recursive_delete() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let web = app(&plane, dev, "web").await;
    let db = instance(&plane, dev, "db").await;
    let binding = plane
        .create_service_binding(
            &admin,
            CreateServiceBinding {
                app_id: web,
                service_instance_id: db,
            },
        )
        .await
        .unwrap();

    let err = plane
        .delete_service_instance(&admin, db, false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Constraint(ConstraintViolation::AssociationNotEmpty { .. })
    ));

    let deleted = plane.delete_service_instance(&admin, db, true).await.unwrap();
    assert_eq!(deleted.ids(ResourceKind::ServiceBinding), vec![binding.id]);
    assert_eq!(deleted.ids(ResourceKind::ServiceInstance), vec![db]);
    plane.get_app(&admin, web).await.unwrap();
}

// -----------------------------------------------------------------------
// Domains and routes
// -----------------------------------------------------------------------

#[tokio::test]
async fn private_domains_stay_with_their_owner() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let globex = org(&plane, "globex").await;

    let private = plane
        .create_domain(
            &admin,
            CreateDomain {
                name: "acme.example.com".into(),
                owning_organization_id: Some(acme),
            },
        )
        .await
        .unwrap();
    let shared = plane
        .create_domain(
            &admin,
            CreateDomain {
                name: "apps.example.com".into(),
                owning_organization_id: None,
            },
        )
        .await
        .unwrap();

    let err = plane
        .add_domain(&admin, globex, private.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Constraint(ConstraintViolation::UnauthorizedAccessToPrivateDomain { .. })
    ));
    plane.add_domain(&admin, acme, private.id).await.unwrap();
    plane.add_domain(&admin, globex, shared.id).await.unwrap();

    // Routes follow the same rule.
    let globex_space = space(&plane, globex, "web").await;
    let err = plane
        .create_route(
            &admin,
            CreateRoute {
                space_id: globex_space,
                domain_id: private.id,
                host: "www".into(),
                path: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Constraint(ConstraintViolation::UnauthorizedAccessToPrivateDomain { .. })
    ));
    let route = plane
        .create_route(
            &admin,
            CreateRoute {
                space_id: globex_space,
                domain_id: shared.id,
                host: "www".into(),
                path: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(route.path, "");

    let err = plane.delete_domain(&admin, shared.id).await.unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Constraint(ConstraintViolation::AssociationNotEmpty { .. })
    ));
}

#[tokio::test]
async fn members_list_shared_and_own_private_domains() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let globex = org(&plane, "globex").await;
    for (name, owner) in [
        ("apps.example.com", None),
        ("acme.example.com", Some(acme)),
        ("globex.example.com", Some(globex)),
    ] {
        plane
            .create_domain(
                &admin,
                CreateDomain {
                    name: name.into(),
                    owning_organization_id: owner,
                },
            )
            .await
            .unwrap();
    }

    let alice = register(&plane, "alice").await;
    plane
        .add_organization_role(&admin, acme, alice, OrgRole::User)
        .await
        .unwrap();
    let mut names: Vec<String> = plane
        .list_domains(&perms_for(&plane, alice).await, Pagination::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|d| d.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["acme.example.com", "apps.example.com"]);
}

// -----------------------------------------------------------------------
// Security groups
// -----------------------------------------------------------------------

#[tokio::test]
async fn security_groups_visible_when_global_or_bound_to_own_space() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;
    let outsider = register(&plane, "outsider").await;

    let group = |name: &str, running: bool| CreateSecurityGroup {
        name: name.into(),
        rules: vec![],
        globally_enabled: GloballyEnabled {
            running,
            staging: false,
        },
    };
    let public = plane
        .create_security_group(&admin, group("public", true))
        .await
        .unwrap();
    let bound = plane
        .create_security_group(&admin, group("bound", false))
        .await
        .unwrap();
    let hidden = plane
        .create_security_group(&admin, group("hidden", false))
        .await
        .unwrap();
    plane
        .bind_security_group(&admin, bound.id, dev, Lifecycle::Running)
        .await
        .unwrap();

    let dev_perms = perms_for(&plane, developer).await;
    let mut seen: Vec<Uuid> = plane
        .list_security_groups(&dev_perms, Pagination::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|g| g.id)
        .collect();
    seen.sort();
    let mut expected = vec![public.id, bound.id];
    expected.sort();
    assert_eq!(seen, expected);

    let err = plane
        .get_security_group(&dev_perms, hidden.id)
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::NotFound { .. }));

    let outsider_view = plane
        .list_security_groups(&perms_for(&plane, outsider).await, Pagination::default())
        .await
        .unwrap();
    assert_eq!(outsider_view.total, 1);
    assert_eq!(outsider_view.items[0].id, public.id);

    let relationships = plane
        .security_group_relationships(&dev_perms, bound.id)
        .await
        .unwrap();
    assert_eq!(
        relationships.running_spaces.guids().collect::<Vec<_>>(),
        vec![dev]
    );
    assert!(relationships.staging_spaces.data.is_empty());
}

// -----------------------------------------------------------------------
// Credentials and space roles
// -----------------------------------------------------------------------

#[tokio::test]
async fn credentials_are_for_developers_only() {
    let plane = setup().await;
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;
    let auditor = space_member(&plane, acme, dev, SpaceRole::Auditor).await;
    let outsider = register(&plane, "outsider").await;

    let dev_perms = perms_for(&plane, developer).await;
    let credentials = json!({ "uri": "postgres://db.internal:5432/app", "password": "s3cret" });
    let created = plane
        .create_service_instance(
            &dev_perms,
            CreateServiceInstance {
                credentials: Some(credentials.clone()),
                ..user_provided(dev, "db")
            },
        )
        .await
        .unwrap();
    assert!(created.encrypted_credentials.is_some());
    assert_eq!(
        serde_json::to_value(&created).unwrap().get("encrypted_credentials"),
        None
    );

    let revealed = plane
        .service_instance_credentials(&dev_perms, created.id)
        .await
        .unwrap();
    assert_eq!(revealed, credentials);

    let auditor_perms = perms_for(&plane, auditor).await;
    plane
        .get_service_instance(&auditor_perms, created.id)
        .await
        .unwrap();
    let err = plane
        .service_instance_credentials(&auditor_perms, created.id)
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::Forbidden { .. }));

    let err = plane
        .service_instance_credentials(&perms_for(&plane, outsider).await, created.id)
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::NotFound { .. }));
}

#[tokio::test]
async fn non_object_credentials_are_rejected() {
    let plane = setup().await;
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;

    let err = plane
        .create_service_instance(
            &Permissions::system(),
            CreateServiceInstance {
                credentials: Some(json!(["not", "an", "object"])),
                ..user_provided(dev, "db")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::Validation(_)));
}

#[tokio::test]
async fn space_auditor_cannot_create_apps() {
    let plane = setup().await;
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let auditor = space_member(&plane, acme, dev, SpaceRole::Auditor).await;

    let err = plane
        .create_app(
            &perms_for(&plane, auditor).await,
            CreateApp {
                space_id: dev,
                name: "web".into(),
                memory_mb: None,
                instances: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::Forbidden { .. }));
}

#[tokio::test]
async fn developers_list_only_their_spaces_apps() {
    let plane = setup().await;
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let prod = space(&plane, acme, "prod").await;
    let web = app(&plane, dev, "web").await;
    app(&plane, prod, "api").await;
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;

    let perms = perms_for(&plane, developer).await;
    let apps = plane
        .list_apps(&perms, None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(apps.total, 1);
    assert_eq!(apps.items[0].id, web);

    let err = plane
        .list_apps(&perms, Some(prod), Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// Cascading deletes
// -----------------------------------------------------------------------

#[tokio::test]
async fn non_recursive_delete_of_populated_organization_fails() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    space(&plane, acme, "dev").await;

    let err = plane
        .delete_organization(&admin, acme, false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Constraint(ConstraintViolation::AssociationNotEmpty { .. })
    ));
    plane.get_organization(&admin, acme).await.unwrap();
}

#[tokio::test]
async fn recursive_organization_delete_removes_subtree() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let globex = org(&plane, "globex").await;
    let dev = space(&plane, acme, "dev").await;
    let prod = space(&plane, acme, "prod").await;
    let untouched_space = space(&plane, globex, "dev").await;

    let web = app(&plane, dev, "web").await;
    let api = app(&plane, prod, "api").await;
    let batch = app(&plane, prod, "batch").await;
    plane.start_app(&admin, web).await.unwrap();
    plane.start_app(&admin, api).await.unwrap();

    let db = instance(&plane, dev, "db").await;
    plane
        .create_service_binding(
            &admin,
            CreateServiceBinding {
                app_id: web,
                service_instance_id: db,
            },
        )
        .await
        .unwrap();
    let shared = plane
        .create_domain(
            &admin,
            CreateDomain {
                name: "apps.example.com".into(),
                owning_organization_id: None,
            },
        )
        .await
        .unwrap();
    let private = plane
        .create_domain(
            &admin,
            CreateDomain {
                name: "acme.example.com".into(),
                owning_organization_id: Some(acme),
            },
        )
        .await
        .unwrap();
    plane
        .create_route(
            &admin,
            CreateRoute {
                space_id: dev,
                domain_id: private.id,
                host: "www".into(),
                path: Some("/shop".into()),
            },
        )
        .await
        .unwrap();
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;
    let survivor = app(&plane, untouched_space, "web").await;

    let deleted = plane.delete_organization(&admin, acme, true).await.unwrap();
    assert_eq!(deleted.ids(ResourceKind::Organization), vec![acme]);
    assert_eq!(deleted.ids(ResourceKind::Space).len(), 2);
    assert_eq!(deleted.ids(ResourceKind::App).len(), 3);
    assert_eq!(deleted.ids(ResourceKind::ServiceInstance), vec![db]);
    assert_eq!(deleted.ids(ResourceKind::ServiceBinding).len(), 1);
    assert_eq!(deleted.ids(ResourceKind::Route).len(), 1);
    assert_eq!(deleted.ids(ResourceKind::Domain), vec![private.id]);

    assert!(matches!(
        plane.get_organization(&admin, acme).await.unwrap_err(),
        NimbusError::NotFound { .. }
    ));
    assert!(matches!(
        plane.get_app(&admin, batch).await.unwrap_err(),
        NimbusError::NotFound { .. }
    ));
    plane.get_domain(&admin, shared.id).await.unwrap();
    plane.get_app(&admin, survivor).await.unwrap();
    assert!(
        plane
            .store()
            .roles()
            .roles_for_user(developer)
            .await
            .unwrap()
            .space_roles
            .is_empty()
    );
    assert!(plane.store().apps().list_by_spaces(&[dev, prod]).await.unwrap().is_empty());

    for (started, id) in [(true, web), (true, api), (false, batch)] {
        let events = plane
            .store()
            .usage_events()
            .list_for_resource(id)
            .await
            .unwrap();
        let stopped = events
            .iter()
            .filter(|e| e.kind == UsageEventKind::App && e.state == UsageState::Stopped)
            .count();
        assert_eq!(stopped, usize::from(started), "app {id}");
        assert!(events.iter().all(|e| e.organization_id == acme));
        assert!(
            events
                .iter()
                .any(|e| e.state == UsageState::Deleted)
        );
    }
}

#[tokio::test]
async fn usage_log_is_for_global_readers() {
    let plane = setup().await;
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;
    let web = app(&plane, dev, "web").await;

    let log = plane
        .list_usage_events(&Permissions::system(), Pagination::default())
        .await
        .unwrap();
    assert!(log.items.iter().any(|e| e.resource_id == web && e.state == UsageState::Created));

    let err = plane
        .list_usage_events(&perms_for(&plane, developer).await, Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::Forbidden { .. }));
}

/// Kinds of the STOPPED events recorded for a resource, sorted.
async fn stop_kinds(plane: &Plane, resource_id: Uuid) -> Vec<UsageEventKind> {
    let mut kinds: Vec<UsageEventKind> = plane
        .store()
        .usage_events()
        .list_for_resource(resource_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.state == UsageState::Stopped)
        .map(|e| e.kind)
        .collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds
}

async fn redefine_event_names(db: &Surreal<Db>, definition: &str) {
    db.query(format!(
        "DEFINE FIELD OVERWRITE resource_name ON TABLE usage_event {definition}"
    ))
    .await
    .unwrap()
    .check()
    .unwrap();
}

// -----------------------------------------------------------------------
// Space, app and route deletes
// -----------------------------------------------------------------------

#[tokio::test]
async fn non_recursive_delete_of_populated_space_fails() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let web = app(&plane, dev, "web").await;

    let err = plane.delete_space(&admin, dev, false).await.unwrap_err();
    assert!(matches!(
        err,
        NimbusError::Constraint(ConstraintViolation::AssociationNotEmpty { .. })
    ));
    plane.get_space(&admin, dev).await.unwrap();
    plane.get_app(&admin, web).await.unwrap();

    let empty = space(&plane, acme, "empty").await;
    let deleted = plane.delete_space(&admin, empty, false).await.unwrap();
    assert_eq!(deleted.ids(ResourceKind::Space), vec![empty]);
}

#[tokio::test]
async fn recursive_space_delete_removes_children_and_edges() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let prod = space(&plane, acme, "prod").await;

    let web = app(&plane, dev, "web").await;
    let idle = app(&plane, dev, "idle").await;
    let kept = app(&plane, prod, "web").await;
    plane.start_app(&admin, web).await.unwrap();
    let db = instance(&plane, dev, "db").await;
    let binding = plane
        .create_service_binding(
            &admin,
            CreateServiceBinding {
                app_id: web,
                service_instance_id: db,
            },
        )
        .await
        .unwrap();
    let shared = plane
        .create_domain(
            &admin,
            CreateDomain {
                name: "apps.example.com".into(),
                owning_organization_id: None,
            },
        )
        .await
        .unwrap();
    let route = plane
        .create_route(
            &admin,
            CreateRoute {
                space_id: dev,
                domain_id: shared.id,
                host: "web".into(),
                path: None,
            },
        )
        .await
        .unwrap();
    let group = plane
        .create_security_group(
            &admin,
            CreateSecurityGroup {
                name: "dev-egress".into(),
                rules: vec![],
                globally_enabled: GloballyEnabled::default(),
            },
        )
        .await
        .unwrap();
    plane
        .bind_security_group(&admin, group.id, dev, Lifecycle::Running)
        .await
        .unwrap();
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;

    let deleted = plane.delete_space(&admin, dev, true).await.unwrap();
    assert_eq!(deleted.ids(ResourceKind::Space), vec![dev]);
    let mut apps = deleted.ids(ResourceKind::App);
    apps.sort();
    let mut expected = vec![web, idle];
    expected.sort();
    assert_eq!(apps, expected);
    assert_eq!(deleted.ids(ResourceKind::ServiceInstance), vec![db]);
    assert_eq!(deleted.ids(ResourceKind::ServiceBinding), vec![binding.id]);
    assert_eq!(deleted.ids(ResourceKind::Route), vec![route.id]);
    assert!(!deleted.contains(kept));

    assert!(matches!(
        plane.get_space(&admin, dev).await.unwrap_err(),
        NimbusError::NotFound { .. }
    ));
    plane.get_organization(&admin, acme).await.unwrap();
    plane.get_app(&admin, kept).await.unwrap();
    plane.get_domain(&admin, shared.id).await.unwrap();
    let relationships = plane
        .security_group_relationships(&admin, group.id)
        .await
        .unwrap();
    assert!(relationships.all_space_ids().is_empty());
    assert!(
        plane
            .store()
            .roles()
            .roles_for_user(developer)
            .await
            .unwrap()
            .space_roles
            .is_empty()
    );

    assert_eq!(stop_kinds(&plane, web).await, vec![UsageEventKind::App]);
    assert!(stop_kinds(&plane, idle).await.is_empty());
}

#[tokio::test]
async fn deleting_an_app_removes_its_bindings() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let web = app(&plane, dev, "web").await;
    let db = instance(&plane, dev, "db").await;
    let binding = plane
        .create_service_binding(
            &admin,
            CreateServiceBinding {
                app_id: web,
                service_instance_id: db,
            },
        )
        .await
        .unwrap();

    let deleted = plane.delete_app(&admin, web).await.unwrap();
    assert_eq!(deleted.ids(ResourceKind::App), vec![web]);
    assert_eq!(deleted.ids(ResourceKind::ServiceBinding), vec![binding.id]);

    assert!(matches!(
        plane.get_app(&admin, web).await.unwrap_err(),
        NimbusError::NotFound { .. }
    ));
    plane.get_service_instance(&admin, db).await.unwrap();
    assert!(
        plane
            .store()
            .service_bindings()
            .list_by_service_instance(db)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn routes_are_deleted_by_developers_only() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let auditor = space_member(&plane, acme, dev, SpaceRole::Auditor).await;
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;
    let shared = plane
        .create_domain(
            &admin,
            CreateDomain {
                name: "apps.example.com".into(),
                owning_organization_id: None,
            },
        )
        .await
        .unwrap();
    let route = plane
        .create_route(
            &admin,
            CreateRoute {
                space_id: dev,
                domain_id: shared.id,
                host: "web".into(),
                path: None,
            },
        )
        .await
        .unwrap();

    let err = plane
        .delete_route(&perms_for(&plane, auditor).await, route.id)
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::Forbidden { .. }));
    plane.get_route(&admin, route.id).await.unwrap();

    plane
        .delete_route(&perms_for(&plane, developer).await, route.id)
        .await
        .unwrap();
    assert!(matches!(
        plane.get_route(&admin, route.id).await.unwrap_err(),
        NimbusError::NotFound { .. }
    ));
}

// -----------------------------------------------------------------------
// Security group bindings
// -----------------------------------------------------------------------

#[tokio::test]
async fn unbinding_a_security_group_leaves_other_lifecycle() {
    let plane = setup().await;
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let developer = space_member(&plane, acme, dev, SpaceRole::Developer).await;
    let group = plane
        .create_security_group(
            &admin,
            CreateSecurityGroup {
                name: "egress".into(),
                rules: vec![],
                globally_enabled: GloballyEnabled::default(),
            },
        )
        .await
        .unwrap();
    for lifecycle in [Lifecycle::Running, Lifecycle::Staging] {
        plane
            .bind_security_group(&admin, group.id, dev, lifecycle)
            .await
            .unwrap();
    }

    plane
        .unbind_security_group(&admin, group.id, dev, Lifecycle::Running)
        .await
        .unwrap();
    let relationships = plane
        .security_group_relationships(&admin, group.id)
        .await
        .unwrap();
    assert!(relationships.running_spaces.data.is_empty());
    assert_eq!(
        relationships.staging_spaces.guids().collect::<Vec<_>>(),
        vec![dev]
    );

    plane
        .unbind_security_group(&admin, group.id, dev, Lifecycle::Staging)
        .await
        .unwrap();
    let err = plane
        .get_security_group(&perms_for(&plane, developer).await, group.id)
        .await
        .unwrap_err();
    assert!(matches!(err, NimbusError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// App lifecycle usage events
// -----------------------------------------------------------------------

#[tokio::test]
async fn stopping_an_app_records_stopped_and_billing_events() {
    let config = ControlConfig {
        billing_event_writing_enabled: true,
        ..config()
    };
    let plane = ControlPlane::new(SurrealStore::new(memory_db().await), config);
    let admin = Permissions::system();
    let billed = plane
        .create_organization(
            &admin,
            CreateOrganization {
                name: "acme".into(),
                billing_enabled: true,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id;
    let unbilled = org(&plane, "globex").await;
    let web = app(&plane, space(&plane, billed, "dev").await, "web").await;
    let api = app(&plane, space(&plane, unbilled, "dev").await, "api").await;

    for id in [web, api] {
        plane.start_app(&admin, id).await.unwrap();
        let stopped = plane.stop_app(&admin, id).await.unwrap();
        assert_eq!(stopped.state, AppState::Stopped);
    }

    assert_eq!(
        stop_kinds(&plane, web).await,
        vec![UsageEventKind::App, UsageEventKind::Billing]
    );
    assert_eq!(stop_kinds(&plane, api).await, vec![UsageEventKind::App]);
}

#[tokio::test]
async fn failed_usage_event_write_undoes_the_app_change() {
    let db = memory_db().await;
    let plane = ControlPlane::new(SurrealStore::new(db.clone()), config());
    let admin = Permissions::system();
    let acme = org(&plane, "acme").await;
    let dev = space(&plane, acme, "dev").await;
    let web = app(&plane, dev, "web").await;

    redefine_event_names(&db, "TYPE string ASSERT false").await;

    let create = || CreateApp {
        space_id: dev,
        name: "api".into(),
        memory_mb: Some(128),
        instances: Some(1),
    };
    assert!(plane.create_app(&admin, create()).await.is_err());
    assert!(plane.start_app(&admin, web).await.is_err());
    assert_eq!(
        plane.get_app(&admin, web).await.unwrap().state,
        AppState::Stopped
    );
    assert!(
        plane
            .store()
            .apps()
            .find_by_name(dev, "api")
            .await
            .unwrap()
            .is_none()
    );

    redefine_event_names(&db, "TYPE string").await;
    let api = plane.create_app(&admin, create()).await.unwrap();
    let states: Vec<UsageState> = plane
        .store()
        .usage_events()
        .list_for_resource(api.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.state)
        .collect();
    assert_eq!(states, vec![UsageState::Created]);
}
