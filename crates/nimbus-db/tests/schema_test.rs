//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    nimbus_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "organization",
        "space",
        "domain",
        "app",
        "service_instance",
        "service_binding",
        "route",
        "security_group",
        "quota_definition",
        "service_plan_visibility",
        "user",
        "usage_event",
        "_migration",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }

    for edge in [
        "org_role",
        "space_role",
        "staging_space",
        "running_space",
    ] {
        assert!(info_str.contains(edge), "missing {edge} edge");
    }
    // Spaces hang off their organization by `organization_id` alone.
    assert!(!info_str.contains("has_space"));
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    nimbus_db::run_migrations(&db).await.unwrap();
    nimbus_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 1, "expected exactly one migration record");
}

#[tokio::test]
async fn unique_index_prevents_duplicate_organization_names() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    nimbus_db::run_migrations(&db).await.unwrap();

    db.query("CREATE organization SET name = 'acme'")
        .await
        .unwrap()
        .check()
        .unwrap();

    let second = db
        .query("CREATE organization SET name = 'acme'")
        .await
        .unwrap()
        .check();
    assert!(second.is_err(), "duplicate name should be rejected");
    let message = second.unwrap_err().to_string();
    assert!(message.contains("already contains"), "got: {message}");
}

#[tokio::test]
async fn space_names_are_scoped_to_their_organization() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    nimbus_db::run_migrations(&db).await.unwrap();

    db.query(
        "CREATE space SET organization_id = 'a', name = 'dev'; \
         CREATE space SET organization_id = 'b', name = 'dev';",
    )
    .await
    .unwrap()
    .check()
    .unwrap();

    let clash = db
        .query("CREATE space SET organization_id = 'a', name = 'dev'")
        .await
        .unwrap()
        .check();
    assert!(clash.is_err());
}

#[tokio::test]
async fn enum_fields_reject_unknown_values() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    nimbus_db::run_migrations(&db).await.unwrap();

    let bad = db
        .query("CREATE organization SET name = 'x', status = 'frozen'")
        .await
        .unwrap()
        .check();
    assert!(bad.is_err());
}
