//! SurrealDB implementation of [`SpaceRepository`].

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::space::{CreateSpace, Space, UpdateSpace};
use nimbus_core::repository::SpaceRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, classify, id_strings, parse_uuid};

const ENTITY: &str = "space";

#[derive(Debug, SurrealValue)]
struct SpaceRow {
    record_id: String,
    organization_id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SpaceRow {
    fn try_into_space(self) -> Result<Space, DbError> {
        Ok(Space {
            id: parse_uuid(ENTITY, &self.record_id)?,
            organization_id: parse_uuid(ENTITY, &self.organization_id)?,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_spaces(rows: Vec<SpaceRow>) -> Result<Vec<Space>, DbError> {
    rows.into_iter().map(SpaceRow::try_into_space).collect()
}

/// SurrealDB implementation of the Space repository.
#[derive(Clone)]
pub struct SurrealSpaceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSpaceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SpaceRepository for SurrealSpaceRepository<C> {
    async fn create(&self, input: CreateSpace) -> NimbusResult<Space> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('space', $id) SET \
                 organization_id = $org_id, name = $name",
            )
            .bind(("id", id.to_string()))
            .bind(("org_id", input.organization_id.to_string()))
            .bind(("name", input.name.clone()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.name))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<Space> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('space', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SpaceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_space()?)
    }

    async fn find_by_name(&self, organization_id: Uuid, name: &str) -> NimbusResult<Option<Space>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM space \
                 WHERE organization_id = $org_id AND name = $name",
            )
            .bind(("org_id", organization_id.to_string()))
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SpaceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_spaces(rows)?.into_iter().next())
    }

    async fn update(&self, id: Uuid, input: UpdateSpace) -> NimbusResult<Space> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        sets.push("updated_at = time::now()");

        let key = input.name.clone().unwrap_or_else(|| id.to_string());
        let mut builder = self
            .db
            .query(format!(
                "UPDATE type::record('space', $id) SET {}",
                sets.join(", ")
            ))
            .bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, key))?;

        self.get_by_id(id).await
    }

    async fn list_by_organization(&self, organization_id: Uuid) -> NimbusResult<Vec<Space>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM space \
                 WHERE organization_id = $org_id ORDER BY created_at ASC",
            )
            .bind(("org_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SpaceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_spaces(rows)?)
    }

    async fn list_all(&self) -> NimbusResult<Vec<Space>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM space ORDER BY created_at ASC")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SpaceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_spaces(rows)?)
    }

    async fn list_by_ids(&self, ids: &[Uuid]) -> NimbusResult<Vec<Space>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM space \
                 WHERE meta::id(id) IN $ids ORDER BY created_at ASC",
            )
            .bind(("ids", id_strings(ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SpaceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_spaces(rows)?)
    }
}
