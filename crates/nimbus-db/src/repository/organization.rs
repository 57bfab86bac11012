//! SurrealDB implementation of [`OrganizationRepository`].

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::organization::{
    CreateOrganization, Organization, OrganizationStatus, UpdateOrganization,
};
use nimbus_core::models::role::OrgRole;
use nimbus_core::repository::{OrganizationRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::role::grant_org_role_stmt;
use super::{CountRow, total};
use crate::error::{
    DbError, LAST_MANAGER, classify, classify_membership, id_strings, parse_opt_uuid, parse_uuid,
};

const ENTITY: &str = "organization";

#[derive(Debug, SurrealValue)]
struct OrganizationRow {
    record_id: String,
    name: String,
    status: String,
    billing_enabled: bool,
    quota_definition_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrganizationRow {
    fn try_into_organization(self) -> Result<Organization, DbError> {
        let status = OrganizationStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt(ENTITY, format!("unknown status '{}'", self.status)))?;
        Ok(Organization {
            id: parse_uuid(ENTITY, &self.record_id)?,
            name: self.name,
            status,
            billing_enabled: self.billing_enabled,
            quota_definition_id: parse_opt_uuid(ENTITY, self.quota_definition_id.as_deref())?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Organization repository.
#[derive(Clone)]
pub struct SurrealOrganizationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOrganizationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_where(
        &self,
        filter: &str,
        key: &'static str,
        value: String,
    ) -> NimbusResult<Vec<Organization>> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM organization \
             WHERE {filter} ORDER BY created_at ASC"
        );
        let mut result = self
            .db
            .query(query)
            .bind((key, value))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(OrganizationRow::try_into_organization)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

impl<C: Connection> OrganizationRepository for SurrealOrganizationRepository<C> {
    async fn create(
        &self,
        input: CreateOrganization,
        manager_id: Option<Uuid>,
    ) -> NimbusResult<Organization> {
        let id = Uuid::new_v4();
        let status = input.status.unwrap_or_default();

        // The CREATE is the first statement so a unique index violation is
        // the first error reported for the transaction.
        let mut statements = vec![
            "BEGIN TRANSACTION;".to_string(),
            "CREATE type::record('organization', $id) SET \
             name = $name, status = $status, \
             billing_enabled = $billing_enabled, \
             quota_definition_id = $quota_definition_id;"
                .to_string(),
        ];
        if let Some(manager_id) = manager_id {
            statements.push(grant_org_role_stmt(id, manager_id, OrgRole::User));
            statements.push(grant_org_role_stmt(id, manager_id, OrgRole::Manager));
        }
        statements.push("COMMIT TRANSACTION;".to_string());

        self.db
            .query(statements.join("\n"))
            .bind(("id", id.to_string()))
            .bind(("name", input.name.clone()))
            .bind(("status", status.as_str()))
            .bind(("billing_enabled", input.billing_enabled))
            .bind((
                "quota_definition_id",
                input.quota_definition_id.map(|q| q.to_string()),
            ))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.name))?;

        info!(organization_id = %id, name = %input.name, "Organization created");
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<Organization> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('organization', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_organization()?)
    }

    async fn find_by_name(&self, name: &str) -> NimbusResult<Option<Organization>> {
        Ok(self
            .select_where("name = $name", "name", name.to_string())
            .await?
            .into_iter()
            .next())
    }

    async fn update(&self, id: Uuid, input: UpdateOrganization) -> NimbusResult<Organization> {
        let id_str = id.to_string();
        let mut statements = vec!["BEGIN TRANSACTION;".to_string()];

        // Guard first: its THROW must be the first failure in the response.
        if input.manager_ids.as_ref().is_some_and(Vec::is_empty) {
            statements.push(format!(
                "IF array::len((SELECT VALUE id FROM org_role \
                 WHERE organization_id = $org_id AND role = 'manager')) > 0 \
                 {{ THROW '{LAST_MANAGER}' }};"
            ));
        }

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.billing_enabled.is_some() {
            sets.push("billing_enabled = $billing_enabled");
        }
        if input.quota_definition_id.is_some() {
            sets.push("quota_definition_id = $quota_definition_id");
        }
        sets.push("updated_at = time::now()");
        statements.push(format!(
            "UPDATE type::record('organization', $org_id) SET {};",
            sets.join(", ")
        ));

        if let Some(managers) = &input.manager_ids {
            statements.push(
                "DELETE org_role WHERE organization_id = $org_id \
                 AND role = 'manager' AND user_id NOT IN $manager_ids;"
                    .to_string(),
            );
            for manager in managers {
                statements.push(grant_org_role_stmt(id, *manager, OrgRole::User));
                statements.push(grant_org_role_stmt(id, *manager, OrgRole::Manager));
            }
        }
        statements.push("COMMIT TRANSACTION;".to_string());

        let duplicate_key = input.name.clone().unwrap_or_else(|| id_str.clone());
        let mut builder = self
            .db
            .query(statements.join("\n"))
            .bind(("org_id", id_str))
            .bind((
                "manager_ids",
                id_strings(input.manager_ids.as_deref().unwrap_or_default()),
            ));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status.as_str()));
        }
        if let Some(billing_enabled) = input.billing_enabled {
            builder = builder.bind(("billing_enabled", billing_enabled));
        }
        if let Some(quota) = input.quota_definition_id {
            builder = builder.bind(("quota_definition_id", quota.to_string()));
        }

        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| match classify_membership(ENTITY, id, None)(e) {
                DbError::Duplicate { entity, .. } => DbError::Duplicate {
                    entity,
                    key: duplicate_key,
                },
                other => other,
            })?;

        self.get_by_id(id).await
    }

    async fn list(&self, pagination: Pagination) -> NimbusResult<PaginatedResult<Organization>> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM organization GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM organization \
                 ORDER BY created_at ASC LIMIT $limit START $offset;",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<OrganizationRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(OrganizationRow::try_into_organization)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: total(counts),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_by_ids(&self, ids: &[Uuid]) -> NimbusResult<Vec<Organization>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM organization \
                 WHERE meta::id(id) IN $ids ORDER BY created_at ASC",
            )
            .bind(("ids", id_strings(ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(OrganizationRow::try_into_organization)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn count_by_quota(&self, quota_definition_id: Uuid) -> NimbusResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM organization \
                 WHERE quota_definition_id = $quota GROUP ALL",
            )
            .bind(("quota", quota_definition_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total(counts))
    }
}
