//! SurrealDB implementation of [`QuotaDefinitionRepository`].

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::quota::{CreateQuotaDefinition, QuotaDefinition, UpdateQuotaDefinition};
use nimbus_core::repository::QuotaDefinitionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, classify, parse_uuid};

const ENTITY: &str = "quota_definition";

#[derive(Debug, SurrealValue)]
struct QuotaRow {
    record_id: String,
    name: String,
    memory_limit_mb: u64,
    instance_memory_limit_mb: Option<u64>,
    total_services: Option<u32>,
    total_routes: Option<u32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QuotaRow {
    fn try_into_quota(self) -> Result<QuotaDefinition, DbError> {
        Ok(QuotaDefinition {
            id: parse_uuid(ENTITY, &self.record_id)?,
            name: self.name,
            memory_limit_mb: self.memory_limit_mb,
            instance_memory_limit_mb: self.instance_memory_limit_mb,
            total_services: self.total_services,
            total_routes: self.total_routes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_quotas(rows: Vec<QuotaRow>) -> Result<Vec<QuotaDefinition>, DbError> {
    rows.into_iter().map(QuotaRow::try_into_quota).collect()
}

/// SurrealDB implementation of the QuotaDefinition repository.
#[derive(Clone)]
pub struct SurrealQuotaDefinitionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealQuotaDefinitionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> QuotaDefinitionRepository for SurrealQuotaDefinitionRepository<C> {
    async fn create(&self, input: CreateQuotaDefinition) -> NimbusResult<QuotaDefinition> {
        let id = Uuid::new_v4();

        let mut sets = vec!["name = $name", "memory_limit_mb = $memory_limit_mb"];
        if input.instance_memory_limit_mb.is_some() {
            sets.push("instance_memory_limit_mb = $instance_memory_limit_mb");
        }
        if input.total_services.is_some() {
            sets.push("total_services = $total_services");
        }
        if input.total_routes.is_some() {
            sets.push("total_routes = $total_routes");
        }

        let mut builder = self
            .db
            .query(format!(
                "CREATE type::record('quota_definition', $id) SET {}",
                sets.join(", ")
            ))
            .bind(("id", id.to_string()))
            .bind(("name", input.name.clone()))
            .bind(("memory_limit_mb", input.memory_limit_mb));
        if let Some(limit) = input.instance_memory_limit_mb {
            builder = builder.bind(("instance_memory_limit_mb", limit));
        }
        if let Some(limit) = input.total_services {
            builder = builder.bind(("total_services", limit));
        }
        if let Some(limit) = input.total_routes {
            builder = builder.bind(("total_routes", limit));
        }
        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.name))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<QuotaDefinition> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('quota_definition', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<QuotaRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_quota()?)
    }

    async fn find_by_name(&self, name: &str) -> NimbusResult<Option<QuotaDefinition>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM quota_definition WHERE name = $name")
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<QuotaRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_quotas(rows)?.into_iter().next())
    }

    async fn update(&self, id: Uuid, input: UpdateQuotaDefinition) -> NimbusResult<QuotaDefinition> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.memory_limit_mb.is_some() {
            sets.push("memory_limit_mb = $memory_limit_mb");
        }
        if input.instance_memory_limit_mb.is_some() {
            sets.push("instance_memory_limit_mb = $instance_memory_limit_mb");
        }
        if input.total_services.is_some() {
            sets.push("total_services = $total_services");
        }
        if input.total_routes.is_some() {
            sets.push("total_routes = $total_routes");
        }
        sets.push("updated_at = time::now()");

        let key = input.name.clone().unwrap_or_else(|| id.to_string());
        let mut builder = self
            .db
            .query(format!(
                "UPDATE type::record('quota_definition', $id) SET {}",
                sets.join(", ")
            ))
            .bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(limit) = input.memory_limit_mb {
            builder = builder.bind(("memory_limit_mb", limit));
        }
        if let Some(limit) = input.instance_memory_limit_mb {
            builder = builder.bind(("instance_memory_limit_mb", limit));
        }
        if let Some(limit) = input.total_services {
            builder = builder.bind(("total_services", limit));
        }
        if let Some(limit) = input.total_routes {
            builder = builder.bind(("total_routes", limit));
        }
        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, key))?;

        self.get_by_id(id).await
    }

    async fn list_all(&self) -> NimbusResult<Vec<QuotaDefinition>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM quota_definition \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;
        let rows: Vec<QuotaRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_quotas(rows)?)
    }

    async fn delete(&self, id: Uuid) -> NimbusResult<()> {
        self.db
            .query("DELETE type::record('quota_definition', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, id))?;
        Ok(())
    }
}
