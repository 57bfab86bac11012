//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: resource graph
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Organizations
-- =======================================================================
DEFINE TABLE organization SCHEMAFULL;
DEFINE FIELD name ON TABLE organization TYPE string;
DEFINE FIELD status ON TABLE organization TYPE string \
    DEFAULT 'active' ASSERT $value IN ['active', 'suspended'];
DEFINE FIELD billing_enabled ON TABLE organization TYPE bool \
    DEFAULT false;
DEFINE FIELD quota_definition_id ON TABLE organization \
    TYPE option<string>;
DEFINE FIELD created_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_organization_name ON TABLE organization \
    COLUMNS name UNIQUE;
DEFINE INDEX idx_organization_quota ON TABLE organization \
    COLUMNS quota_definition_id;

-- =======================================================================
-- Spaces (organization scope)
-- =======================================================================
DEFINE TABLE space SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE space TYPE string;
DEFINE FIELD name ON TABLE space TYPE string;
DEFINE FIELD created_at ON TABLE space TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE space TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_space_org_name ON TABLE space \
    COLUMNS organization_id, name UNIQUE;

-- =======================================================================
-- Domains (shared when owning_organization_id is NONE)
-- =======================================================================
DEFINE TABLE domain SCHEMAFULL;
DEFINE FIELD name ON TABLE domain TYPE string;
DEFINE FIELD owning_organization_id ON TABLE domain \
    TYPE option<string>;
DEFINE FIELD created_at ON TABLE domain TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE domain TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_domain_name ON TABLE domain COLUMNS name UNIQUE;
DEFINE INDEX idx_domain_owner ON TABLE domain \
    COLUMNS owning_organization_id;

-- =======================================================================
-- Apps (space scope)
-- =======================================================================
DEFINE TABLE app SCHEMAFULL;
DEFINE FIELD space_id ON TABLE app TYPE string;
DEFINE FIELD name ON TABLE app TYPE string;
DEFINE FIELD state ON TABLE app TYPE string \
    ASSERT $value IN ['STOPPED', 'STARTED'];
DEFINE FIELD memory_mb ON TABLE app TYPE int ASSERT $value > 0;
DEFINE FIELD instances ON TABLE app TYPE int ASSERT $value >= 0;
DEFINE FIELD package_state ON TABLE app TYPE string \
    ASSERT $value IN ['PENDING', 'STAGED', 'FAILED'];
DEFINE FIELD created_at ON TABLE app TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE app TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_app_space_name ON TABLE app \
    COLUMNS space_id, name UNIQUE;

-- =======================================================================
-- Service instances (space scope)
-- =======================================================================
DEFINE TABLE service_instance SCHEMAFULL;
DEFINE FIELD space_id ON TABLE service_instance TYPE string;
DEFINE FIELD name ON TABLE service_instance TYPE string;
DEFINE FIELD kind ON TABLE service_instance TYPE string \
    ASSERT $value IN ['managed', 'user_provided'];
DEFINE FIELD service_plan_id ON TABLE service_instance \
    TYPE option<string>;
DEFINE FIELD syslog_drain_url ON TABLE service_instance \
    TYPE option<string>;
DEFINE FIELD encrypted_credentials ON TABLE service_instance \
    TYPE option<string>;
DEFINE FIELD created_at ON TABLE service_instance TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE service_instance TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_service_instance_space_name ON TABLE service_instance \
    COLUMNS space_id, name UNIQUE;

-- =======================================================================
-- Service bindings (space scope)
-- =======================================================================
DEFINE TABLE service_binding SCHEMAFULL;
DEFINE FIELD app_id ON TABLE service_binding TYPE string;
DEFINE FIELD service_instance_id ON TABLE service_binding TYPE string;
DEFINE FIELD space_id ON TABLE service_binding TYPE string;
DEFINE FIELD created_at ON TABLE service_binding TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE service_binding TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_binding_app_instance ON TABLE service_binding \
    COLUMNS app_id, service_instance_id UNIQUE;
DEFINE INDEX idx_binding_space ON TABLE service_binding \
    COLUMNS space_id;

-- =======================================================================
-- Routes (space scope)
-- =======================================================================
DEFINE TABLE route SCHEMAFULL;
DEFINE FIELD space_id ON TABLE route TYPE string;
DEFINE FIELD domain_id ON TABLE route TYPE string;
DEFINE FIELD host ON TABLE route TYPE string;
DEFINE FIELD path ON TABLE route TYPE string;
DEFINE FIELD created_at ON TABLE route TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE route TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_route_address ON TABLE route \
    COLUMNS domain_id, host, path UNIQUE;
DEFINE INDEX idx_route_space ON TABLE route COLUMNS space_id;

-- =======================================================================
-- Security groups (global scope)
-- =======================================================================
DEFINE TABLE security_group SCHEMAFULL;
DEFINE FIELD name ON TABLE security_group TYPE string;
DEFINE FIELD rules ON TABLE security_group TYPE array DEFAULT [];
DEFINE FIELD rules.* ON TABLE security_group TYPE object FLEXIBLE;
DEFINE FIELD running_enabled ON TABLE security_group TYPE bool \
    DEFAULT false;
DEFINE FIELD staging_enabled ON TABLE security_group TYPE bool \
    DEFAULT false;
DEFINE FIELD created_at ON TABLE security_group TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE security_group TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_security_group_name ON TABLE security_group \
    COLUMNS name UNIQUE;

-- =======================================================================
-- Quota definitions (global scope)
-- =======================================================================
DEFINE TABLE quota_definition SCHEMAFULL;
DEFINE FIELD name ON TABLE quota_definition TYPE string;
DEFINE FIELD memory_limit_mb ON TABLE quota_definition TYPE int \
    ASSERT $value >= 0;
DEFINE FIELD instance_memory_limit_mb ON TABLE quota_definition \
    TYPE option<int>;
DEFINE FIELD total_services ON TABLE quota_definition \
    TYPE option<int>;
DEFINE FIELD total_routes ON TABLE quota_definition TYPE option<int>;
DEFINE FIELD created_at ON TABLE quota_definition TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE quota_definition TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_quota_name ON TABLE quota_definition \
    COLUMNS name UNIQUE;

-- =======================================================================
-- Service plan visibilities (organization scope)
-- =======================================================================
DEFINE TABLE service_plan_visibility SCHEMAFULL;
DEFINE FIELD service_plan_id ON TABLE service_plan_visibility \
    TYPE string;
DEFINE FIELD organization_id ON TABLE service_plan_visibility \
    TYPE string;
DEFINE FIELD created_at ON TABLE service_plan_visibility \
    TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE service_plan_visibility \
    TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_plan_visibility_pair ON TABLE service_plan_visibility \
    COLUMNS service_plan_id, organization_id UNIQUE;
DEFINE INDEX idx_plan_visibility_org ON TABLE service_plan_visibility \
    COLUMNS organization_id;

-- =======================================================================
-- Users (global scope)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_username ON TABLE user COLUMNS username UNIQUE;

-- =======================================================================
-- Usage events (append-only)
-- =======================================================================
DEFINE TABLE usage_event SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD kind ON TABLE usage_event TYPE string \
    ASSERT $value IN ['app', 'service', 'billing'];
DEFINE FIELD state ON TABLE usage_event TYPE string \
    ASSERT $value IN ['CREATED', 'STARTED', 'STOPPED', 'UPDATED', \
    'DELETED'];
DEFINE FIELD resource_id ON TABLE usage_event TYPE string;
DEFINE FIELD resource_name ON TABLE usage_event TYPE string;
DEFINE FIELD organization_id ON TABLE usage_event TYPE string;
DEFINE FIELD space_id ON TABLE usage_event TYPE option<string>;
DEFINE FIELD memory_mb ON TABLE usage_event TYPE option<int>;
DEFINE FIELD instances ON TABLE usage_event TYPE option<int>;
DEFINE FIELD sequence ON TABLE usage_event TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE usage_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_usage_resource ON TABLE usage_event \
    COLUMNS resource_id, created_at;
DEFINE INDEX idx_usage_org_time ON TABLE usage_event \
    COLUMNS organization_id, created_at;

-- =======================================================================
-- Graph Edge Tables (relations)
-- =======================================================================

-- User -> Organization role
DEFINE TABLE org_role TYPE RELATION SCHEMAFULL;
DEFINE FIELD user_id ON TABLE org_role TYPE string;
DEFINE FIELD organization_id ON TABLE org_role TYPE string;
DEFINE FIELD role ON TABLE org_role TYPE string \
    ASSERT $value IN ['user', 'manager', 'billing_manager', 'auditor'];
DEFINE FIELD created_at ON TABLE org_role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_org_role_unique ON TABLE org_role \
    COLUMNS organization_id, user_id, role UNIQUE;
DEFINE INDEX idx_org_role_user ON TABLE org_role COLUMNS user_id;

-- User -> Space role
DEFINE TABLE space_role TYPE RELATION SCHEMAFULL;
DEFINE FIELD user_id ON TABLE space_role TYPE string;
DEFINE FIELD space_id ON TABLE space_role TYPE string;
DEFINE FIELD organization_id ON TABLE space_role TYPE string;
DEFINE FIELD role ON TABLE space_role TYPE string \
    ASSERT $value IN ['developer', 'manager', 'auditor'];
DEFINE FIELD created_at ON TABLE space_role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_space_role_unique ON TABLE space_role \
    COLUMNS space_id, user_id, role UNIQUE;
DEFINE INDEX idx_space_role_org_user ON TABLE space_role \
    COLUMNS organization_id, user_id;

-- SecurityGroup -> Space, applied while staging
DEFINE TABLE staging_space TYPE RELATION SCHEMAFULL;
DEFINE FIELD security_group_id ON TABLE staging_space TYPE string;
DEFINE FIELD space_id ON TABLE staging_space TYPE string;
DEFINE FIELD created_at ON TABLE staging_space TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_staging_space_unique ON TABLE staging_space \
    COLUMNS security_group_id, space_id UNIQUE;

-- SecurityGroup -> Space, applied while running
DEFINE TABLE running_space TYPE RELATION SCHEMAFULL;
DEFINE FIELD security_group_id ON TABLE running_space TYPE string;
DEFINE FIELD space_id ON TABLE running_space TYPE string;
DEFINE FIELD created_at ON TABLE running_space TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_running_space_unique ON TABLE running_space \
    COLUMNS security_group_id, space_id UNIQUE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

async fn current_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates the `_migration` tracking table on first run, then applies
/// every migration newer than the recorded version. A migration and its
/// tracking record commit in the same transaction, so a failed migration
/// leaves no partial schema behind and is retried on the next start.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current = current_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        info!(version = current, "Schema is up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        let sql = format!(
            "BEGIN TRANSACTION;\n{}\nCREATE _migration SET version = $version, name = $name;\nCOMMIT TRANSACTION;",
            migration.sql
        );
        db.query(sql)
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "v{} '{}': {e}",
                    migration.version, migration.name
                ))
            })?;
    }

    info!(
        version = MIGRATIONS.last().map(|m| m.version).unwrap_or(0),
        "Migrations applied"
    );
    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn scoped_names_have_unique_indexes() {
        for index in [
            "idx_organization_name ON TABLE organization COLUMNS name UNIQUE",
            "idx_space_org_name ON TABLE space COLUMNS organization_id, name UNIQUE",
            "idx_security_group_name ON TABLE security_group COLUMNS name UNIQUE",
        ] {
            assert!(SCHEMA_V1.contains(index), "missing unique index: {index}");
        }
    }
}
