//! SurrealDB implementation of [`SecurityGroupRepository`].
//!
//! Space bindings are `staging_space` / `running_space` edges
//! (security_group -> space). Rules are stored as a flexible object array
//! in their wire shape.

use chrono::{DateTime, Utc};
use nimbus_core::error::{NimbusError, NimbusResult};
use nimbus_core::models::security_group::{
    CreateSecurityGroup, GloballyEnabled, Lifecycle, SecurityGroup, SecurityGroupRelationships,
    SecurityGroupRule, UpdateSecurityGroup,
};
use nimbus_core::repository::SecurityGroupRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, classify, id_strings, parse_uuid};

const ENTITY: &str = "security_group";

#[derive(Debug, SurrealValue)]
struct SecurityGroupRow {
    record_id: String,
    name: String,
    rules: serde_json::Value,
    running_enabled: bool,
    staging_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SecurityGroupRow {
    fn try_into_group(self) -> Result<SecurityGroup, DbError> {
        let rules: Vec<SecurityGroupRule> = serde_json::from_value(self.rules)
            .map_err(|e| DbError::corrupt(ENTITY, format!("invalid rules: {e}")))?;
        Ok(SecurityGroup {
            id: parse_uuid(ENTITY, &self.record_id)?,
            name: self.name,
            rules,
            globally_enabled: GloballyEnabled {
                running: self.running_enabled,
                staging: self.staging_enabled,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_groups(rows: Vec<SecurityGroupRow>) -> Result<Vec<SecurityGroup>, DbError> {
    rows.into_iter().map(SecurityGroupRow::try_into_group).collect()
}

fn rules_value(rules: &[SecurityGroupRule]) -> NimbusResult<serde_json::Value> {
    serde_json::to_value(rules).map_err(|e| NimbusError::Internal(format!("rule encoding: {e}")))
}

#[derive(Debug, SurrealValue)]
struct BoundSpaceRow {
    space_id: String,
}

#[derive(Debug, SurrealValue)]
struct BoundGroupRow {
    security_group_id: String,
}

/// SurrealDB implementation of the SecurityGroup repository.
#[derive(Clone)]
pub struct SurrealSecurityGroupRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSecurityGroupRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SecurityGroupRepository for SurrealSecurityGroupRepository<C> {
    async fn create(&self, input: CreateSecurityGroup) -> NimbusResult<SecurityGroup> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('security_group', $id) SET \
                 name = $name, rules = $rules, \
                 running_enabled = $running, staging_enabled = $staging",
            )
            .bind(("id", id.to_string()))
            .bind(("name", input.name.clone()))
            .bind(("rules", rules_value(&input.rules)?))
            .bind(("running", input.globally_enabled.running))
            .bind(("staging", input.globally_enabled.staging))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.name))?;

        info!(security_group_id = %id, name = %input.name, "Security group created");
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<SecurityGroup> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('security_group', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SecurityGroupRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_group()?)
    }

    async fn find_by_name(&self, name: &str) -> NimbusResult<Option<SecurityGroup>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM security_group WHERE name = $name")
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SecurityGroupRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_groups(rows)?.into_iter().next())
    }

    async fn update(&self, id: Uuid, input: UpdateSecurityGroup) -> NimbusResult<SecurityGroup> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.rules.is_some() {
            sets.push("rules = $rules");
        }
        if input.globally_enabled.is_some() {
            sets.push("running_enabled = $running");
            sets.push("staging_enabled = $staging");
        }
        sets.push("updated_at = time::now()");

        let key = input.name.clone().unwrap_or_else(|| id.to_string());
        let mut builder = self
            .db
            .query(format!(
                "UPDATE type::record('security_group', $id) SET {}",
                sets.join(", ")
            ))
            .bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(rules) = &input.rules {
            builder = builder.bind(("rules", rules_value(rules)?));
        }
        if let Some(enabled) = input.globally_enabled {
            builder = builder
                .bind(("running", enabled.running))
                .bind(("staging", enabled.staging));
        }
        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, key))?;

        self.get_by_id(id).await
    }

    async fn delete(&self, id: Uuid) -> NimbusResult<()> {
        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE staging_space WHERE security_group_id = $id; \
                 DELETE running_space WHERE security_group_id = $id; \
                 DELETE type::record('security_group', $id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, id))?;

        info!(security_group_id = %id, "Security group deleted");
        Ok(())
    }

    async fn list_all(&self) -> NimbusResult<Vec<SecurityGroup>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM security_group \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SecurityGroupRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_groups(rows)?)
    }

    async fn relationships(&self, id: Uuid) -> NimbusResult<SecurityGroupRelationships> {
        let mut result = self
            .db
            .query(
                "SELECT space_id, created_at FROM staging_space \
                 WHERE security_group_id = $id ORDER BY created_at ASC; \
                 SELECT space_id, created_at FROM running_space \
                 WHERE security_group_id = $id ORDER BY created_at ASC;",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let staging: Vec<BoundSpaceRow> = result.take(0).map_err(DbError::from)?;
        let running: Vec<BoundSpaceRow> = result.take(1).map_err(DbError::from)?;

        let parse = |rows: Vec<BoundSpaceRow>| {
            rows.iter()
                .map(|r| parse_uuid(ENTITY, &r.space_id))
                .collect::<Result<Vec<_>, DbError>>()
        };
        Ok(SecurityGroupRelationships {
            staging_spaces: parse(staging)?.into_iter().collect(),
            running_spaces: parse(running)?.into_iter().collect(),
        })
    }

    async fn ids_bound_to_spaces(&self, space_ids: &[Uuid]) -> NimbusResult<Vec<Uuid>> {
        if space_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT security_group_id FROM staging_space WHERE space_id IN $space_ids; \
                 SELECT security_group_id FROM running_space WHERE space_id IN $space_ids;",
            )
            .bind(("space_ids", id_strings(space_ids)))
            .await
            .map_err(DbError::from)?;
        let mut rows: Vec<BoundGroupRow> = result.take(0).map_err(DbError::from)?;
        let running: Vec<BoundGroupRow> = result.take(1).map_err(DbError::from)?;
        rows.extend(running);

        let mut ids = rows
            .iter()
            .map(|r| parse_uuid(ENTITY, &r.security_group_id))
            .collect::<Result<Vec<_>, DbError>>()?;
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn bind_space(&self, id: Uuid, space_id: Uuid, lifecycle: Lifecycle) -> NimbusResult<()> {
        let table = lifecycle.edge_table();
        let query = format!(
            "IF array::len((SELECT VALUE id FROM {table} \
             WHERE security_group_id = $id AND space_id = $space_id)) = 0 {{ \
             RELATE security_group:`{id}` -> {table} -> space:`{space_id}` \
             SET security_group_id = $id, space_id = $space_id }};"
        );

        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("space_id", space_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(table, format!("{id}/{space_id}")))?;

        info!(security_group_id = %id, %space_id, lifecycle = table, "Security group bound to space");
        Ok(())
    }

    async fn unbind_space(&self, id: Uuid, space_id: Uuid, lifecycle: Lifecycle) -> NimbusResult<()> {
        let table = lifecycle.edge_table();
        self.db
            .query(format!(
                "DELETE {table} WHERE security_group_id = $id AND space_id = $space_id"
            ))
            .bind(("id", id.to_string()))
            .bind(("space_id", space_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(table, id))?;
        Ok(())
    }
}
